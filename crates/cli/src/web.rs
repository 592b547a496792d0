//! Browser-facing chat page that proxies questions to the API server.

use axum::{
    extract::{rejection::FormRejection, State},
    http::{header, HeaderMap, HeaderValue},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const SESSION_COOKIE: &str = "ragbot_session";
const INDEX_HTML: &str = include_str!("../assets/index.html");

#[derive(Clone)]
pub struct WebState {
    client: reqwest::Client,
    api_url: Arc<str>,
}

impl WebState {
    pub fn new(api_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: Arc::from(api_url.trim_end_matches('/')),
        }
    }

    fn endpoint(&self, route: &str) -> String {
        format!("{}{}", self.api_url, route)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatForm {
    pub message: String,
}

/// Value of the session cookie, if the request carries one.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Every visit starts a new conversation.
async fn home() -> Response {
    let session = uuid::Uuid::new_v4();
    let cookie = format!("{SESSION_COOKIE}={session}; Path=/; HttpOnly; SameSite=Lax");
    let mut resp = Html(INDEX_HTML).into_response();
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            resp.headers_mut().insert(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!("invalid session cookie: {}", e),
    }
    resp
}

async fn chat(
    State(state): State<WebState>,
    headers: HeaderMap,
    form: Result<Form<ChatForm>, FormRejection>,
) -> Response {
    let Some(session) = session_id(&headers) else {
        return Json(json!({ "answer": "Session not started" })).into_response();
    };
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            tracing::warn!("Invalid chat form: {}", rejection);
            return rejection.into_response();
        }
    };
    tracing::info!("Sending question: {}", form.message);
    let result = async {
        let resp = state
            .client
            .post(state.endpoint("/ask"))
            .json(&json!({ "question": form.message, "session_id": session }))
            .send()
            .await?;
        resp.json::<Value>().await
    }
    .await;
    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            tracing::error!("Error connecting to the API: {}", e);
            Json(json!({ "answer": format!("Error connecting to the API: {e}") })).into_response()
        }
    }
}

async fn feedback(State(state): State<WebState>, Json(data): Json<Value>) -> Json<Value> {
    tracing::info!("Receiving feedback: {}", data);
    let result = async {
        let resp = state
            .client
            .post(state.endpoint("/feedback"))
            .json(&data)
            .send()
            .await?;
        resp.json::<Value>().await
    }
    .await;
    match result {
        Ok(body) => Json(body),
        Err(e) => {
            tracing::error!("Error forwarding feedback: {}", e);
            Json(json!({ "status": "error" }))
        }
    }
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/chat", post(chat))
        .route("/feedback", post(feedback))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_session_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; ragbot_session=abc-123; lang=es"),
        );
        assert_eq!(session_id(&headers).as_deref(), Some("abc-123"));
    }

    #[test]
    fn empty_or_missing_cookie_is_no_session() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(&headers), None);
        headers.insert(header::COOKIE, HeaderValue::from_static("ragbot_session="));
        assert_eq!(session_id(&headers), None);
    }
}
