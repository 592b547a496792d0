mod common;

use common::{registry, write_corpus, FakeLlm};
use ragbot_core::config::AppConfig;
use ragbot_core::ingest::{run_ingest, IngestSummary};
use ragbot_core::retriever::Retriever;
use ragbot_core::vectorstore::{LocalVectorStore, VectorStore};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn config_in(root: &Path) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.paths.data = root.join("data").to_string_lossy().into_owned();
    cfg.paths.embeddings = root.join("embeddings").to_string_lossy().into_owned();
    cfg
}

#[tokio::test]
async fn missing_data_dir_is_an_error() {
    let temp = tempdir().unwrap();
    let cfg = config_in(temp.path());
    let store = LocalVectorStore::open(Path::new(&cfg.paths.embeddings))
        .await
        .unwrap();
    let err = run_ingest(&cfg, &registry(Arc::new(FakeLlm::default())), &store)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ragbot convert"));
}

#[tokio::test]
async fn empty_data_dir_ingests_nothing() {
    let temp = tempdir().unwrap();
    let cfg = config_in(temp.path());
    std::fs::create_dir_all(&cfg.paths.data).unwrap();
    let store = LocalVectorStore::open(Path::new(&cfg.paths.embeddings))
        .await
        .unwrap();
    let summary = run_ingest(&cfg, &registry(Arc::new(FakeLlm::default())), &store)
        .await
        .unwrap();
    assert_eq!(summary, IngestSummary::default());
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn reingesting_overwrites_instead_of_duplicating() {
    let temp = tempdir().unwrap();
    let mut cfg = config_in(temp.path());
    cfg.splitter.chunk_size = 50;
    cfg.splitter.chunk_overlap = 10;
    write_corpus(Path::new(&cfg.paths.data));
    let reg = registry(Arc::new(FakeLlm::default()));

    let store = LocalVectorStore::open(Path::new(&cfg.paths.embeddings))
        .await
        .unwrap();
    let summary = run_ingest(&cfg, &reg, &store).await.unwrap();
    assert_eq!(summary.files, 2);
    assert_eq!(summary.documents, 2);
    assert!(summary.chunks >= 3);
    assert_eq!(store.count().await.unwrap(), summary.chunks as u64);

    run_ingest(&cfg, &reg, &store).await.unwrap();
    let reopened = LocalVectorStore::load(Path::new(&cfg.paths.embeddings))
        .await
        .unwrap();
    assert_eq!(reopened.count().await.unwrap(), summary.chunks as u64);

    let mut retrieval = cfg.retrieval.clone();
    retrieval.k = 2;
    let retriever = Retriever::new(Arc::new(reopened), reg, retrieval);
    let docs = retriever.retrieve("Azure security audits").await.unwrap();
    assert_eq!(docs.len(), 2);
    assert!(docs[0].text.contains("Azure"));
}
