use crate::models::DocumentChunk;
use crate::vectorstore::VectorRecord;
use providers::ProviderRegistry;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct EmbeddingRequest {
    pub texts: Vec<String>,
    pub provider: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub vectors: Vec<Vec<f32>>,
}

pub async fn embed(
    req: EmbeddingRequest,
    registry: &ProviderRegistry,
) -> anyhow::Result<EmbeddingResult> {
    let provider = registry.embedding(req.provider.as_deref())?;
    let resp = provider.embed(&req.texts).await?;
    if resp.vectors.len() != req.texts.len() {
        anyhow::bail!(
            "embedding provider returned {} vectors for {} texts",
            resp.vectors.len(),
            req.texts.len()
        );
    }
    Ok(EmbeddingResult {
        vectors: resp.vectors,
    })
}

/// Embeds a single query with the preferred provider.
pub async fn embed_query(text: &str, registry: &ProviderRegistry) -> anyhow::Result<Vec<f32>> {
    let result = embed(
        EmbeddingRequest {
            texts: vec![text.to_string()],
            provider: None,
        },
        registry,
    )
    .await?;
    result
        .vectors
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no embedding returned for query"))
}

/// Embeds chunks in batches and turns them into vector records.
pub async fn embed_chunks(
    chunks: &[DocumentChunk],
    registry: &ProviderRegistry,
    batch_size: usize,
) -> anyhow::Result<Vec<VectorRecord>> {
    let mut records = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size.max(1)) {
        let req = EmbeddingRequest {
            texts: batch.iter().map(|c| c.text.clone()).collect(),
            provider: None, // Use preferred provider
        };
        let embeddings = embed(req, registry).await?;
        for (chunk, vector) in batch.iter().zip(embeddings.vectors) {
            let mut metadata = HashMap::new();
            metadata.insert("source".to_string(), chunk.source.clone());
            metadata.insert("chunk".to_string(), chunk.index.to_string());
            records.push(VectorRecord {
                id: chunk.point_id(),
                vector,
                text: chunk.text.clone(),
                metadata,
            });
        }
        tracing::debug!(batch = batch.len(), total = records.len(), "embedded batch");
    }
    Ok(records)
}
