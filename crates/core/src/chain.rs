//! Conversational retrieval: condense, retrieve, answer, remember.

use crate::config::LlmConfig;
use crate::history::{render_history, ChatHistory};
use crate::models::ChatMessage;
use crate::prompt::PromptTemplate;
use crate::retriever::Retriever;
use anyhow::Context;
use providers::{CompletionRequest, ProviderRegistry};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainAnswer {
    pub answer: String,
    pub sources: Vec<String>,
}

pub struct ConversationalChain {
    registry: ProviderRegistry,
    retriever: Retriever,
    history: Arc<dyn ChatHistory>,
    answer_prompt: PromptTemplate,
    condense_prompt: PromptTemplate,
    llm: LlmConfig,
}

impl ConversationalChain {
    pub fn new(
        registry: ProviderRegistry,
        retriever: Retriever,
        history: Arc<dyn ChatHistory>,
        answer_prompt: PromptTemplate,
        llm: LlmConfig,
    ) -> Self {
        Self {
            registry,
            retriever,
            history,
            answer_prompt,
            condense_prompt: PromptTemplate::condense(),
            llm,
        }
    }

    fn request(&self, prompt: String) -> CompletionRequest {
        CompletionRequest {
            prompt,
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
            seed: self.llm.seed,
            context_window: Some(self.llm.context_window),
        }
    }

    async fn complete(&self, prompt: String) -> anyhow::Result<String> {
        let llm = self.registry.llm(None)?;
        let completion = llm.complete(&self.request(prompt)).await?;
        Ok(completion.text.trim().to_string())
    }

    pub async fn ask(&self, session_id: &str, question: &str) -> anyhow::Result<ChainAnswer> {
        let past = self
            .history
            .messages(session_id)
            .await
            .context("load chat history")?;
        let chat_history = render_history(&past);

        let standalone = if past.is_empty() {
            question.to_string()
        } else {
            let prompt = self.condense_prompt.render(&HashMap::from([
                ("chat_history", chat_history.as_str()),
                ("question", question),
            ]));
            let condensed = self.complete(prompt).await.context("condense question")?;
            debug!(%condensed, "condensed follow-up question");
            if condensed.is_empty() {
                question.to_string()
            } else {
                condensed
            }
        };

        let docs = self
            .retriever
            .retrieve(&standalone)
            .await
            .context("retrieve context")?;
        let context = docs
            .iter()
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = self.answer_prompt.render(&HashMap::from([
            ("context", context.as_str()),
            ("chat_history", chat_history.as_str()),
            ("question", standalone.as_str()),
        ]));
        let answer = self.complete(prompt).await.context("generate answer")?;

        self.history
            .append_exchange(
                session_id,
                ChatMessage::human(question),
                ChatMessage::ai(answer.clone()),
            )
            .await
            .context("store chat history")?;

        let mut sources: Vec<String> = Vec::new();
        for doc in &docs {
            if let Some(src) = doc.source() {
                if !sources.iter().any(|s| s == src) {
                    sources.push(src.to_string());
                }
            }
        }
        info!(session = %session_id, documents = docs.len(), "answered question");
        Ok(ChainAnswer { answer, sources })
    }
}
