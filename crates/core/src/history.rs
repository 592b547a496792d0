//! Per-session conversation memory.

use crate::models::{ChatMessage, Role};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[async_trait::async_trait]
pub trait ChatHistory: Send + Sync {
    async fn messages(&self, session_id: &str) -> anyhow::Result<Vec<ChatMessage>>;
    async fn append(&self, session_id: &str, message: ChatMessage) -> anyhow::Result<()>;
    /// Stores a question and its answer together.
    async fn append_exchange(
        &self,
        session_id: &str,
        human: ChatMessage,
        ai: ChatMessage,
    ) -> anyhow::Result<()>;
}

/// History rows in SQLite, keyed by `<prefix><session id>`.
pub struct SqliteChatHistory {
    pool: SqlitePool,
    key_prefix: String,
}

impl SqliteChatHistory {
    pub fn new(pool: SqlitePool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
        }
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}{}", self.key_prefix, session_id)
    }

    pub async fn clear(&self, session_id: &str) -> anyhow::Result<u64> {
        storage::history::clear_session(&self.pool, &self.key(session_id)).await
    }
}

#[async_trait::async_trait]
impl ChatHistory for SqliteChatHistory {
    async fn messages(&self, session_id: &str) -> anyhow::Result<Vec<ChatMessage>> {
        let rows = storage::history::load_messages(&self.pool, &self.key(session_id)).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            match Role::parse(&row.role) {
                Some(role) => out.push(ChatMessage {
                    role,
                    content: row.content,
                }),
                None => tracing::warn!(role = %row.role, "skipping history row with unknown role"),
            }
        }
        Ok(out)
    }

    async fn append(&self, session_id: &str, message: ChatMessage) -> anyhow::Result<()> {
        storage::history::append_message(
            &self.pool,
            &self.key(session_id),
            message.role.as_str(),
            &message.content,
        )
        .await
    }

    async fn append_exchange(
        &self,
        session_id: &str,
        human: ChatMessage,
        ai: ChatMessage,
    ) -> anyhow::Result<()> {
        storage::history::append_messages(
            &self.pool,
            &self.key(session_id),
            &[
                (human.role.as_str(), human.content.as_str()),
                (ai.role.as_str(), ai.content.as_str()),
            ],
        )
        .await
    }
}

#[derive(Default)]
pub struct InMemoryChatHistory {
    sessions: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl InMemoryChatHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ChatHistory for InMemoryChatHistory {
    async fn messages(&self, session_id: &str) -> anyhow::Result<Vec<ChatMessage>> {
        Ok(self
            .sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, session_id: &str, message: ChatMessage) -> anyhow::Result<()> {
        self.sessions
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn append_exchange(
        &self,
        session_id: &str,
        human: ChatMessage,
        ai: ChatMessage,
    ) -> anyhow::Result<()> {
        self.sessions
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default()
            .extend([human, ai]);
        Ok(())
    }
}

/// One `Human: ...` or `Assistant: ...` line per message.
pub fn render_history(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| match m.role {
            Role::Human => format!("Human: {}", m.content),
            Role::Ai => format!("Assistant: {}", m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_roles_in_order() {
        let msgs = vec![ChatMessage::human("hola"), ChatMessage::ai("¡hola!")];
        assert_eq!(render_history(&msgs), "Human: hola\nAssistant: ¡hola!");
        assert_eq!(render_history(&[]), "");
    }

    #[tokio::test]
    async fn sqlite_history_isolates_sessions_by_prefixed_key() {
        let pool = storage::connect("sqlite::memory:").await.unwrap();
        storage::migrate(&pool).await.unwrap();
        let history = SqliteChatHistory::new(pool.clone(), "bot:");

        history.append("s1", ChatMessage::human("q1")).await.unwrap();
        history.append("s1", ChatMessage::ai("a1")).await.unwrap();
        history.append("s2", ChatMessage::human("other")).await.unwrap();

        assert_eq!(
            history.messages("s1").await.unwrap(),
            [ChatMessage::human("q1"), ChatMessage::ai("a1")]
        );
        let raw = storage::history::load_messages(&pool, "bot:s2").await.unwrap();
        assert_eq!(raw.len(), 1);

        history
            .append_exchange("s2", ChatMessage::human("q2"), ChatMessage::ai("a2"))
            .await
            .unwrap();
        assert_eq!(
            history.messages("s2").await.unwrap(),
            [
                ChatMessage::human("other"),
                ChatMessage::human("q2"),
                ChatMessage::ai("a2")
            ]
        );

        assert_eq!(history.clear("s1").await.unwrap(), 2);
        assert!(history.messages("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn in_memory_history_starts_empty() {
        let history = InMemoryChatHistory::new();
        assert!(history.messages("x").await.unwrap().is_empty());
        history.append("x", ChatMessage::human("hi")).await.unwrap();
        assert_eq!(history.messages("x").await.unwrap().len(), 1);
    }
}
