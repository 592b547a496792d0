use crate::chain::ConversationalChain;
use crate::config::AppConfig;
use crate::history::SqliteChatHistory;
use crate::prompt::PromptTemplate;
use crate::retriever::Retriever;
use crate::vectorstore::{self, LocalVectorStore, VectorStore};
use anyhow::Context;
use providers::noop::NoopProvider;
use providers::ollama::{OllamaConfig, OllamaProvider};
use providers::openai::{OpenAiConfig, OpenAiProvider};
use providers::qdrant::{QdrantClient, QdrantConfig};
use providers::{EmbeddingProvider, LlmProvider, ProviderError, ProviderRegistry};
use std::path::Path;
use std::sync::Arc;
use storage::{connect, migrate};
use tracing::info;

const OPENAI_URL: &str = "https://api.openai.com";

fn openai(config: &AppConfig, url: Option<&String>) -> OpenAiProvider {
    OpenAiProvider::new(OpenAiConfig {
        api_key: std::env::var("OPENAI_API_KEY").ok(),
        base_url: url.cloned().unwrap_or_else(|| OPENAI_URL.to_string()),
        embedding_model: config.embeddings.model.clone(),
        chat_model: config.llm.model.clone(),
    })
}

fn ollama(config: &AppConfig, url: Option<&String>) -> OllamaProvider {
    OllamaProvider::new(OllamaConfig {
        base_url: url
            .cloned()
            .unwrap_or_else(|| providers::ollama::DEFAULT_URL.to_string()),
        embedding_model: config.embeddings.model.clone(),
        chat_model: config.llm.model.clone(),
        raw: config.llm.raw_prompt,
    })
}

/// Registers the configured embedding and LLM providers and marks them
/// preferred. The two roles may point at different servers.
pub fn build_registry(config: &AppConfig) -> anyhow::Result<ProviderRegistry> {
    let emb = &config.embeddings;
    let embedder: Arc<dyn EmbeddingProvider> = match emb.provider.as_str() {
        "ollama" => Arc::new(ollama(config, emb.url.as_ref())),
        "openai" => Arc::new(openai(config, emb.url.as_ref())),
        "noop" => Arc::new(NoopProvider),
        other => return Err(ProviderError::UnknownProvider(other.to_string()).into()),
    };
    let llm_cfg = &config.llm;
    let llm: Arc<dyn LlmProvider> = match llm_cfg.provider.as_str() {
        "ollama" => Arc::new(ollama(config, llm_cfg.url.as_ref())),
        "openai" => Arc::new(openai(config, llm_cfg.url.as_ref())),
        "noop" => Arc::new(NoopProvider),
        other => return Err(ProviderError::UnknownProvider(other.to_string()).into()),
    };
    Ok(ProviderRegistry::new()
        .with_embedding(&emb.provider, embedder)
        .with_llm(&llm_cfg.provider, llm)
        .set_preferred_embedding(&emb.provider)
        .set_preferred_llm(&llm_cfg.provider))
}

fn qdrant_client(config: &AppConfig) -> anyhow::Result<QdrantClient> {
    let url = config
        .vectors
        .url
        .clone()
        .context("vectors.url is required for the qdrant provider")?;
    Ok(QdrantClient::new(QdrantConfig {
        url,
        collection: config.vectors.collection.clone(),
        api_key: std::env::var("QDRANT_API_KEY").ok(),
    }))
}

/// Store used for writing; a local store is created if it does not exist.
pub async fn build_vector_store(config: &AppConfig) -> anyhow::Result<Arc<dyn VectorStore>> {
    match config.vectors.provider.as_str() {
        "local" => Ok(Arc::new(
            LocalVectorStore::open(Path::new(&config.paths.embeddings)).await?,
        )),
        "qdrant" => Ok(Arc::new(vectorstore::QdrantStore::new(qdrant_client(config)?))),
        "noop" => Ok(Arc::new(vectorstore::NoopVectorStore)),
        other => anyhow::bail!("unknown vector store provider: {other}"),
    }
}

/// Store used for answering; fails when nothing has been ingested yet.
pub async fn load_vector_store(config: &AppConfig) -> anyhow::Result<Arc<dyn VectorStore>> {
    match config.vectors.provider.as_str() {
        "local" => Ok(Arc::new(
            LocalVectorStore::load(Path::new(&config.paths.embeddings)).await?,
        )),
        "qdrant" => {
            let client = qdrant_client(config)?;
            if !client.collection_exists().await? {
                anyhow::bail!("qdrant collection {} does not exist", client.collection());
            }
            Ok(Arc::new(vectorstore::QdrantStore::new(client)))
        }
        _ => build_vector_store(config).await,
    }
}

pub async fn build_chain(
    config: &AppConfig,
    registry: ProviderRegistry,
    store: Arc<dyn VectorStore>,
) -> anyhow::Result<ConversationalChain> {
    let pool = connect(&config.history.database)
        .await
        .context("history db connect")?;
    migrate(&pool).await.context("history db migrate")?;
    let history = Arc::new(SqliteChatHistory::new(pool, config.history.key_prefix.clone()));

    let answer_prompt = PromptTemplate::answer_from(config.prompt.template_path.as_deref())?;
    let retriever = Retriever::new(store, registry.clone(), config.retrieval.clone());
    info!(
        llm = %config.llm.provider,
        model = %config.llm.model,
        "conversational chain ready"
    );
    Ok(ConversationalChain::new(
        registry,
        retriever,
        history,
        answer_prompt,
        config.llm.clone(),
    ))
}

/// Loads the vector store and assembles the chain for answering questions.
pub async fn load_chain(config: &AppConfig) -> anyhow::Result<ConversationalChain> {
    let registry = build_registry(config)?;
    let store = load_vector_store(config).await.context("load vector store")?;
    info!("vector store loaded ({} records)", store.count().await.unwrap_or(0));
    build_chain(config, registry, store).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_providers_are_rejected() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "llamacpp-inproc".into();
        assert!(build_registry(&cfg).is_err());
    }

    #[test]
    fn registry_prefers_configured_providers() {
        let mut cfg = AppConfig::default();
        cfg.embeddings.provider = "noop".into();
        let reg = build_registry(&cfg).unwrap();
        assert!(reg.embedding(None).is_ok());
        assert!(reg.llm(None).is_ok());
        assert_eq!(reg.preferred_llm.as_deref(), Some("ollama"));
    }

    #[tokio::test]
    async fn local_store_must_exist_before_answering() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.paths.embeddings = dir.path().join("embeddings").to_string_lossy().into_owned();
        assert!(load_vector_store(&cfg).await.is_err());
        assert!(build_vector_store(&cfg).await.is_ok());
    }
}
