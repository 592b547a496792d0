use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub convert: ConvertConfig,
    pub splitter: SplitterConfig,
    pub embeddings: EmbeddingConfig,
    pub vectors: VectorConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub prompt: PromptConfig,
    pub history: HistoryConfig,
    pub api: ApiConfig,
    pub web: WebConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub pdfs: String,
    pub data: String,
    pub embeddings: String,
    pub feedback_log: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            pdfs: "pdfs".into(),
            data: "data".into(),
            embeddings: "embeddings".into(),
            feedback_log: "feedback_data.csv".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub workers: usize,
    /// Tesseract language code used for scanned PDFs.
    pub ocr_lang: String,
    pub txt_glob: String,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            workers: (cpus + 4).min(32),
            ocr_lang: "spa".into(),
            txt_glob: "**/*.txt".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 150,
            separators: ["\n\n", "\n", ". ", "! ", "? ", ", "]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub url: Option<String>,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".into(),
            model: "paraphrase-multilingual".into(),
            url: None,
            batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub provider: String,
    pub url: Option<String>,
    pub collection: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            provider: "local".into(),
            url: None,
            collection: "ragbot".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub context_window: u32,
    pub seed: Option<u64>,
    pub raw_prompt: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".into(),
            model: "mistral:7b-instruct-v0.1-q4_K_M".into(),
            url: None,
            temperature: 0.3,
            max_tokens: 512,
            context_window: 4096,
            seed: Some(42),
            raw_prompt: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k: usize,
    pub fetch_k: usize,
    pub lambda_mult: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 4,
            fetch_k: 20,
            lambda_mult: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// File replacing the built-in answer template.
    pub template_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub database: String,
    pub key_prefix: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            database: "history.db".into(),
            key_prefix: "ragbot:".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub log_file: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            log_file: Some("api.log".into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub api_url: String,
}

impl ApiConfig {
    /// Log file path for the API server. An empty `log_file` turns file
    /// logging off.
    pub fn log_path(&self) -> Option<&str> {
        self.log_file.as_deref().filter(|p| !p.trim().is_empty())
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            api_url: "http://localhost:8000".into(),
        }
    }
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("RAGBOT").separator("__"),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}
