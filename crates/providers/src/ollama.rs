//! Ollama provider: `/api/embed` for embeddings, `/api/generate` for completions.

use crate::{
    status_error, Completion, CompletionRequest, EmbedResponse, EmbeddingProvider, LlmProvider,
    ProviderError,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_URL: &str = "http://localhost:11434";

#[derive(Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    /// Send the prompt verbatim, bypassing the model's chat template. The answer
    /// template already carries its own `[INST]` markers.
    pub raw: bool,
}

#[derive(Clone)]
pub struct OllamaProvider {
    client: Client,
    cfg: Arc<OllamaConfig>,
}

impl OllamaProvider {
    pub fn new(cfg: OllamaConfig) -> Self {
        Self {
            client: Client::new(),
            cfg: Arc::new(cfg),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.cfg.base_url.trim_end_matches('/'), route)
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedApiResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<u32>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    raw: bool,
    options: GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    model: Option<String>,
    response: String,
}

#[async_trait::async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError> {
        if texts.is_empty() {
            return Ok(EmbedResponse { vectors: vec![] });
        }
        let body = EmbedRequest {
            model: &self.cfg.embedding_model,
            input: texts,
        };
        let resp = self
            .client
            .post(self.url("/api/embed"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(format!("ollama: {e}")))?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        let parsed: EmbedApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        if parsed.embeddings.len() != texts.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }
        Ok(EmbedResponse {
            vectors: parsed.embeddings,
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let body = GenerateRequest {
            model: &self.cfg.chat_model,
            prompt: &request.prompt,
            stream: false,
            raw: self.cfg.raw,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
                seed: request.seed,
                num_ctx: request.context_window,
            },
        };
        let resp = self
            .client
            .post(self.url("/api/generate"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(format!("ollama: {e}")))?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(Completion {
            text: parsed.response,
            model: parsed.model,
        })
    }
}
