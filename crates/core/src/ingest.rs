//! Text files to vector store: load, split, embed, upsert.

use crate::config::AppConfig;
use crate::embeddings::embed_chunks;
use crate::loader::{list_text_files, load_documents};
use crate::splitter::RecursiveCharacterSplitter;
use crate::vectorstore::VectorStore;
use providers::ProviderRegistry;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub files: usize,
    pub documents: usize,
    pub chunks: usize,
}

pub async fn run_ingest(
    cfg: &AppConfig,
    registry: &ProviderRegistry,
    store: &dyn VectorStore,
) -> anyhow::Result<IngestSummary> {
    let data_dir = Path::new(&cfg.paths.data);
    info!("Looking for documents in {}", data_dir.display());
    if !data_dir.is_dir() {
        anyhow::bail!(
            "data directory {} does not exist; run `ragbot convert` first",
            data_dir.display()
        );
    }

    let files = list_text_files(data_dir)?;
    info!("Files found in data: {:?}", files);
    if files.is_empty() {
        warn!("No .txt files found in the data directory");
        return Ok(IngestSummary::default());
    }

    let documents = load_documents(data_dir, &cfg.convert.txt_glob)?;
    if documents.is_empty() {
        warn!("No loadable documents found");
        return Ok(IngestSummary {
            files: files.len(),
            ..Default::default()
        });
    }
    info!("Loaded {} documents", documents.len());

    let splitter = RecursiveCharacterSplitter::from_config(&cfg.splitter)?;
    let chunks = splitter.split_documents(&documents);
    info!("Created {} text chunks", chunks.len());

    info!("Creating embeddings...");
    let records = embed_chunks(&chunks, registry, cfg.embeddings.batch_size).await?;
    store.upsert(records).await?;

    info!(
        "Embeddings stored ({} provider) at {}",
        cfg.vectors.provider,
        match cfg.vectors.provider.as_str() {
            "qdrant" => cfg.vectors.collection.clone(),
            _ => cfg.paths.embeddings.clone(),
        }
    );
    Ok(IngestSummary {
        files: files.len(),
        documents: documents.len(),
        chunks: chunks.len(),
    })
}
