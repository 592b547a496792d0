//! Question-answering HTTP API: `/ask`, `/feedback` and `/health`.

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use ragbot_core::chain::ConversationalChain;
use ragbot_core::feedback::FeedbackLog;
use ragbot_core::models::Feedback;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub const NOT_INITIALIZED: &str = "System not initialized correctly";
pub const PROCESSING_ERROR: &str = "Sorry, an error occurred while processing your request";

#[derive(Debug, Deserialize)]
pub struct Query {
    pub question: String,
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl AskResponse {
    fn message(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub vector_store: String,
}

#[derive(Clone)]
pub struct AppState {
    /// `None` when the vector store could not be loaded at startup.
    pub chain: Option<Arc<ConversationalChain>>,
    pub feedback: Arc<FeedbackLog>,
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

async fn ask(State(state): State<AppState>, Json(query): Json<Query>) -> Json<AskResponse> {
    let Some(chain) = &state.chain else {
        return Json(AskResponse::message(NOT_INITIALIZED));
    };
    tracing::info!(
        "Received question: '{}' (Session: {})",
        query.question,
        query.session_id
    );
    match chain.ask(&query.session_id, &query.question).await {
        Ok(result) => {
            tracing::info!("Generated answer: {}...", truncate_chars(&result.answer, 200));
            Json(AskResponse {
                answer: result.answer,
                sources: result.sources,
            })
        }
        Err(e) => {
            tracing::error!("Error processing question: {}", e);
            tracing::error!("{:?}", e);
            Json(AskResponse::message(PROCESSING_ERROR))
        }
    }
}

async fn feedback(
    State(state): State<AppState>,
    Json(feedback): Json<Feedback>,
) -> Json<StatusResponse> {
    let log = Arc::clone(&state.feedback);
    let question = feedback.question.clone();
    let written = tokio::task::spawn_blocking(move || log.append(&feedback)).await;
    let status = match written {
        Ok(Ok(())) => {
            tracing::info!("Feedback received for question: {}", question);
            "feedback received"
        }
        Ok(Err(e)) => {
            tracing::error!("Error saving feedback: {:?}", e);
            "error"
        }
        Err(e) => {
            tracing::error!("Feedback task failed: {}", e);
            "error"
        }
    };
    Json(StatusResponse {
        status: status.to_string(),
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let loaded = state.chain.is_some();
    Json(HealthResponse {
        status: if loaded { "OK" } else { "ERROR" }.to_string(),
        vector_store: if loaded { "LOADED" } else { "MISSING" }.to_string(),
    })
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(ask))
        .route("/feedback", post(feedback))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("ñandú", 3), "ñan");
        assert_eq!(truncate_chars("abc", 200), "abc");
    }
}
