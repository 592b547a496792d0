use anyhow::Context;
use providers::qdrant::{QdrantClient, QdrantPoint};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{OnceCell, RwLock};

pub const LOCAL_STORE_FILE: &str = "vectors.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: HashMap<String, String>,
}

impl VectorRecord {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    pub score: f32,
}

#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, records: Vec<VectorRecord>) -> anyhow::Result<()>;
    /// Nearest records to `query`, best first, with their vectors.
    async fn search(&self, query: &[f32], limit: usize) -> anyhow::Result<Vec<ScoredRecord>>;
    async fn count(&self) -> anyhow::Result<u64>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// Accepts and returns nothing.
pub struct NoopVectorStore;

#[async_trait::async_trait]
impl VectorStore for NoopVectorStore {
    async fn upsert(&self, _records: Vec<VectorRecord>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn search(&self, _query: &[f32], _limit: usize) -> anyhow::Result<Vec<ScoredRecord>> {
        Ok(Vec::new())
    }

    async fn count(&self) -> anyhow::Result<u64> {
        Ok(0)
    }
}

/// Records persisted as a single JSON file inside the embeddings directory.
/// Search is a linear cosine scan.
pub struct LocalVectorStore {
    path: PathBuf,
    records: RwLock<Vec<VectorRecord>>,
}

impl LocalVectorStore {
    /// Opens the store in `dir`, starting empty when no file exists yet.
    pub async fn open(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join(LOCAL_STORE_FILE);
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parse {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
        };
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    /// Opens an existing store; fails when `dir` holds no persisted vectors.
    pub async fn load(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join(LOCAL_STORE_FILE);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            anyhow::bail!("no vector store found at {}", path.display());
        }
        Self::open(dir).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &[VectorRecord]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(records)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl VectorStore for LocalVectorStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> anyhow::Result<()> {
        let mut guard = self.records.write().await;
        let mut positions: HashMap<String, usize> = guard
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        for record in records {
            match positions.get(&record.id) {
                Some(&i) => guard[i] = record,
                None => {
                    positions.insert(record.id.clone(), guard.len());
                    guard.push(record);
                }
            }
        }
        self.persist(&guard).await?;
        tracing::debug!(path = %self.path.display(), total = guard.len(), "persisted vectors");
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize) -> anyhow::Result<Vec<ScoredRecord>> {
        let guard = self.records.read().await;
        let mut scored: Vec<ScoredRecord> = guard
            .iter()
            .map(|r| ScoredRecord {
                score: cosine_similarity(query, &r.vector),
                record: r.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self) -> anyhow::Result<u64> {
        Ok(self.records.read().await.len() as u64)
    }
}

pub struct QdrantStore {
    client: QdrantClient,
    collection_ready: OnceCell<()>,
}

impl QdrantStore {
    pub fn new(client: QdrantClient) -> Self {
        Self {
            client,
            collection_ready: OnceCell::new(),
        }
    }

    pub fn client(&self) -> QdrantClient {
        self.client.clone()
    }
}

fn payload_string(payload: &serde_json::Value, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    })
}

#[async_trait::async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> anyhow::Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let size = first.vector.len();
        self.collection_ready
            .get_or_try_init(|| async { self.client.ensure_collection(size).await })
            .await?;

        let points: Vec<QdrantPoint> = records
            .into_iter()
            .map(|r| {
                let mut payload: HashMap<String, serde_json::Value> = r
                    .metadata
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect();
                payload.insert("text".into(), serde_json::Value::String(r.text));
                QdrantPoint {
                    id: r.id,
                    vector: r.vector,
                    payload,
                }
            })
            .collect();
        self.client.upsert(points).await?;
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize) -> anyhow::Result<Vec<ScoredRecord>> {
        let resp = self
            .client
            .search(query.to_vec(), limit as u64, None)
            .await?;
        let mut out = Vec::with_capacity(resp.result.len());
        for hit in resp.result {
            let payload = hit.payload.unwrap_or(serde_json::Value::Null);
            let text = payload_string(&payload, "text").unwrap_or_default();
            let mut metadata = HashMap::new();
            for key in ["source", "chunk"] {
                if let Some(v) = payload_string(&payload, key) {
                    metadata.insert(key.to_string(), v);
                }
            }
            let id = match hit.id {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            out.push(ScoredRecord {
                score: hit.score,
                record: VectorRecord {
                    id,
                    vector: hit.vector.unwrap_or_default(),
                    text,
                    metadata,
                },
            });
        }
        Ok(out)
    }

    async fn count(&self) -> anyhow::Result<u64> {
        Ok(self.client.count().await?)
    }
}
