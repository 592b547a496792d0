//! Similarity search followed by maximal-marginal-relevance reranking.

use crate::config::RetrievalConfig;
use crate::embeddings::embed_query;
use crate::vectorstore::{cosine_similarity, VectorRecord, VectorStore};
use providers::ProviderRegistry;
use std::sync::Arc;

/// Greedily picks up to `k` candidate indices, trading similarity to `query`
/// against similarity to what was already picked. The first pick is always the
/// candidate closest to the query.
pub fn maximal_marginal_relevance(
    query: &[f32],
    candidates: &[Vec<f32>],
    k: usize,
    lambda_mult: f32,
) -> Vec<usize> {
    let limit = k.min(candidates.len());
    if limit == 0 {
        return Vec::new();
    }
    let to_query: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect();

    let mut best = 0;
    for (i, score) in to_query.iter().enumerate() {
        if *score > to_query[best] {
            best = i;
        }
    }
    let mut picked = vec![best];

    while picked.len() < limit {
        let mut best_score = f32::NEG_INFINITY;
        let mut next = None;
        for (i, query_score) in to_query.iter().enumerate() {
            if picked.contains(&i) {
                continue;
            }
            let redundancy = picked
                .iter()
                .map(|&j| cosine_similarity(&candidates[i], &candidates[j]))
                .fold(f32::NEG_INFINITY, f32::max);
            let score = lambda_mult * query_score - (1.0 - lambda_mult) * redundancy;
            if score > best_score {
                best_score = score;
                next = Some(i);
            }
        }
        match next {
            Some(i) => picked.push(i),
            None => break,
        }
    }
    picked
}

#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    registry: ProviderRegistry,
    cfg: RetrievalConfig,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, registry: ProviderRegistry, cfg: RetrievalConfig) -> Self {
        Self {
            store,
            registry,
            cfg,
        }
    }

    pub async fn retrieve(&self, query: &str) -> anyhow::Result<Vec<VectorRecord>> {
        let vector = embed_query(query, &self.registry).await?;
        let fetch = self.cfg.fetch_k.max(self.cfg.k);
        let mut candidates = self.store.search(&vector, fetch).await?;
        let embeddings: Vec<Vec<f32>> = candidates
            .iter()
            .map(|c| c.record.vector.clone())
            .collect();
        let order = maximal_marginal_relevance(&vector, &embeddings, self.cfg.k, self.cfg.lambda_mult);
        tracing::debug!(candidates = candidates.len(), selected = order.len(), "mmr retrieval");

        let mut slots: Vec<Option<VectorRecord>> =
            candidates.drain(..).map(|c| Some(c.record)).collect();
        Ok(order
            .into_iter()
            .filter_map(|i| slots.get_mut(i).and_then(Option::take))
            .collect())
    }
}
