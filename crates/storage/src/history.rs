//! Rows of the `chat_messages` table, keyed by `<prefix><session id>`.

use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    pub created_at: i64,
}

pub async fn append_message(
    pool: &SqlitePool,
    session_key: &str,
    role: &str,
    content: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO chat_messages (session_key, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(session_key)
    .bind(role)
    .bind(content)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

/// Inserts several messages in one transaction, so either all of them are
/// stored or none are.
pub async fn append_messages(
    pool: &SqlitePool,
    session_key: &str,
    messages: &[(&str, &str)],
) -> anyhow::Result<()> {
    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;
    for (role, content) in messages {
        sqlx::query(
            "INSERT INTO chat_messages (session_key, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(session_key)
        .bind(*role)
        .bind(*content)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Messages for a session in insertion order.
pub async fn load_messages(
    pool: &SqlitePool,
    session_key: &str,
) -> anyhow::Result<Vec<StoredMessage>> {
    let rows = sqlx::query(
        "SELECT role, content, created_at FROM chat_messages WHERE session_key = ?1 ORDER BY id",
    )
    .bind(session_key)
    .fetch_all(pool)
    .await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(StoredMessage {
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
        });
    }
    Ok(out)
}

pub async fn clear_session(pool: &SqlitePool, session_key: &str) -> anyhow::Result<u64> {
    let res = sqlx::query("DELETE FROM chat_messages WHERE session_key = ?1")
        .bind(session_key)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}
