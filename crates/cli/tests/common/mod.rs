#![allow(dead_code)]

use providers::{
    Completion, CompletionRequest, EmbedResponse, EmbeddingProvider, LlmProvider, ProviderError,
    ProviderRegistry,
};
use ragbot_core::chain::ConversationalChain;
use ragbot_core::config::{AppConfig, LlmConfig, RetrievalConfig};
use ragbot_core::history::InMemoryChatHistory;
use ragbot_core::ingest::run_ingest;
use ragbot_core::prompt::PromptTemplate;
use ragbot_core::retriever::Retriever;
use ragbot_core::vectorstore::LocalVectorStore;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const DIMS: usize = 32;

/// Bag-of-words vectors: each lowercase word bumps one hashed dimension.
pub struct FakeEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError> {
        let vectors = texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; DIMS];
                for word in text.split_whitespace() {
                    let word = word
                        .trim_matches(|c: char| !c.is_alphanumeric())
                        .to_lowercase();
                    if word.is_empty() {
                        continue;
                    }
                    let h = word
                        .bytes()
                        .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
                    v[h % DIMS] += 1.0;
                }
                v
            })
            .collect();
        Ok(EmbedResponse { vectors })
    }
}

/// Records every prompt; answers condense prompts with `condensed` and answer
/// prompts with `answer <n>`.
#[derive(Default)]
pub struct FakeLlm {
    pub prompts: Mutex<Vec<String>>,
    pub condensed: String,
}

impl FakeLlm {
    pub fn new(condensed: &str) -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            condensed: condensed.to_string(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmProvider for FakeLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(request.prompt.clone());
        let text = if request.prompt.contains("Standalone question:") {
            format!("  {}  ", self.condensed)
        } else {
            let answers = prompts
                .iter()
                .filter(|p| !p.contains("Standalone question:"))
                .count();
            format!("answer {answers}\n")
        };
        Ok(Completion { text, model: None })
    }
}

pub fn registry(llm: Arc<dyn LlmProvider>) -> ProviderRegistry {
    ProviderRegistry::new()
        .with_embedding("fake", Arc::new(FakeEmbedder))
        .with_llm("fake", llm)
        .set_preferred_embedding("fake")
        .set_preferred_llm("fake")
}

pub fn write_corpus(data_dir: &Path) {
    std::fs::create_dir_all(data_dir).unwrap();
    std::fs::write(
        data_dir.join("cv.txt"),
        "I designed AWS landing zones for ten years.\n\nI run Azure security audits for banks.",
    )
    .unwrap();
    std::fs::write(
        data_dir.join("certs.txt"),
        "Certifications: AWS Solutions Architect Professional, CISSP.",
    )
    .unwrap();
}

/// Ingests the sample corpus under `root` and returns a chain over it.
pub async fn chain_over_corpus(root: &Path, llm: Arc<dyn LlmProvider>) -> ConversationalChain {
    let mut cfg = AppConfig::default();
    cfg.paths.data = root.join("data").to_string_lossy().into_owned();
    cfg.paths.embeddings = root.join("embeddings").to_string_lossy().into_owned();
    write_corpus(Path::new(&cfg.paths.data));

    let registry = registry(llm);
    let store = Arc::new(
        LocalVectorStore::open(Path::new(&cfg.paths.embeddings))
            .await
            .unwrap(),
    );
    run_ingest(&cfg, &registry, store.as_ref()).await.unwrap();

    let retriever = Retriever::new(store, registry.clone(), RetrievalConfig::default());
    ConversationalChain::new(
        registry,
        retriever,
        Arc::new(InMemoryChatHistory::new()),
        PromptTemplate::answer(),
        LlmConfig::default(),
    )
}
