use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Json;
use axum::Router;
use providers::ollama::{OllamaConfig, OllamaProvider};
use providers::openai::{OpenAiConfig, OpenAiProvider};
use providers::qdrant::{QdrantClient, QdrantConfig, QdrantPoint};
use providers::{CompletionRequest, EmbeddingProvider, LlmProvider, ProviderError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Seen {
    method: Method,
    path: String,
    query: Option<String>,
    auth: Option<String>,
    body: Value,
}

type Log = Arc<Mutex<Vec<Seen>>>;

/// Serves every request through `respond` on a loopback port and records it.
async fn spawn_stub<F>(respond: F) -> (String, Log)
where
    F: Fn(&Method, &str, &Value) -> (StatusCode, Value) + Clone + Send + Sync + 'static,
{
    let log: Log = Arc::default();
    let seen = Arc::clone(&log);
    let app = Router::new().fallback(
        move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
            let respond = respond.clone();
            let seen = Arc::clone(&seen);
            async move {
                let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
                let (status, reply) = respond(&method, uri.path(), &body);
                seen.lock().unwrap().push(Seen {
                    method,
                    path: uri.path().to_string(),
                    query: uri.query().map(str::to_string),
                    auth: headers
                        .get("authorization")
                        .or_else(|| headers.get("api-key"))
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string),
                    body,
                });
                (status, Json(reply))
            }
        },
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), log)
}

fn ollama(url: &str, embedding_model: &str) -> OllamaProvider {
    OllamaProvider::new(OllamaConfig {
        base_url: url.to_string(),
        embedding_model: embedding_model.to_string(),
        chat_model: "mistral".to_string(),
        raw: true,
    })
}

fn ollama_stub(_: &Method, path: &str, body: &Value) -> (StatusCode, Value) {
    match path {
        "/api/embed" => {
            let n = body["input"].as_array().map_or(0, Vec::len);
            // The "short" model drops one vector to exercise count checking.
            let n = if body["model"] == "short" { n - 1 } else { n };
            let embeddings: Vec<Vec<f32>> = (0..n).map(|i| vec![i as f32, 1.0]).collect();
            (StatusCode::OK, json!({ "embeddings": embeddings }))
        }
        "/api/generate" => (
            StatusCode::OK,
            json!({ "model": "mistral", "response": " Hola, soy yo. ", "done": true }),
        ),
        _ => (StatusCode::NOT_FOUND, json!({ "error": "not found" })),
    }
}

#[tokio::test]
async fn ollama_embeds_and_generates() {
    let (url, log) = spawn_stub(ollama_stub).await;
    let provider = ollama(&url, "paraphrase-multilingual");

    let texts = vec!["uno".to_string(), "dos".to_string()];
    let resp = provider.embed(&texts).await.unwrap();
    assert_eq!(resp.vectors, vec![vec![0.0, 1.0], vec![1.0, 1.0]]);

    let mut req = CompletionRequest::new("[INST] hola [/INST]");
    req.seed = Some(42);
    req.context_window = Some(4096);
    let completion = provider.complete(&req).await.unwrap();
    assert_eq!(completion.text, " Hola, soy yo. ");
    assert_eq!(completion.model.as_deref(), Some("mistral"));

    let seen = log.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].body["model"], "paraphrase-multilingual");
    let generate = &seen[1].body;
    assert_eq!(seen[1].path, "/api/generate");
    assert_eq!(generate["prompt"], "[INST] hola [/INST]");
    assert_eq!(generate["stream"], false);
    assert_eq!(generate["raw"], true);
    assert_eq!(generate["options"]["num_predict"], 512);
    assert_eq!(generate["options"]["seed"], 42);
    assert_eq!(generate["options"]["num_ctx"], 4096);
}

#[tokio::test]
async fn ollama_rejects_mismatched_embedding_count() {
    let (url, _log) = spawn_stub(ollama_stub).await;
    let provider = ollama(&url, "short");
    let err = provider
        .embed(&["a".to_string(), "b".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse(_)), "{err:?}");
}

#[tokio::test]
async fn ollama_error_status_is_request_failed() {
    let (url, _log) = spawn_stub(|_: &Method, _: &str, _: &Value| {
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "model not loaded" }))
    })
    .await;
    let err = ollama(&url, "m")
        .complete(&CompletionRequest::new("hi"))
        .await
        .unwrap_err();
    match err {
        ProviderError::RequestFailed(msg) => assert!(msg.contains("model not loaded")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn openai_chat_and_embeddings_are_parsed() {
    let (url, log) = spawn_stub(|_: &Method, path: &str, _: &Value| match path {
        "/v1/chat/completions" => (
            StatusCode::OK,
            json!({
                "model": "gpt-4o-mini",
                "choices": [{ "index": 0, "message": { "role": "assistant", "content": "hello" } }]
            }),
        ),
        "/v1/embeddings" => (
            StatusCode::OK,
            json!({ "data": [{ "embedding": [0.5, 0.5] }] }),
        ),
        _ => (StatusCode::NOT_FOUND, json!({})),
    })
    .await;
    let provider = OpenAiProvider::new(OpenAiConfig {
        api_key: Some("sk-test".into()),
        base_url: format!("{url}/"),
        embedding_model: "text-embedding-3-small".into(),
        chat_model: "gpt-4o-mini".into(),
    });

    let completion = provider
        .complete(&CompletionRequest::new("question"))
        .await
        .unwrap();
    assert_eq!(completion.text, "hello");
    assert_eq!(completion.model.as_deref(), Some("gpt-4o-mini"));

    let resp = provider.embed(&["x".to_string()]).await.unwrap();
    assert_eq!(resp.vectors, vec![vec![0.5, 0.5]]);

    let seen = log.lock().unwrap().clone();
    assert_eq!(seen[0].auth.as_deref(), Some("Bearer sk-test"));
    assert_eq!(seen[0].body["messages"][0]["role"], "user");
    assert_eq!(seen[0].body["messages"][0]["content"], "question");
    assert_eq!(seen[0].body["max_tokens"], 512);
    assert_eq!(seen[1].body["input"], json!(["x"]));
}

#[tokio::test]
async fn openai_without_choices_is_invalid() {
    let (url, _log) = spawn_stub(|_: &Method, _: &str, _: &Value| {
        (StatusCode::OK, json!({ "choices": [] }))
    })
    .await;
    let provider = OpenAiProvider::new(OpenAiConfig {
        api_key: None,
        base_url: url,
        embedding_model: "e".into(),
        chat_model: "c".into(),
    });
    let err = provider
        .complete(&CompletionRequest::new("q"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse(_)));
}

#[tokio::test]
async fn qdrant_client_creates_upserts_searches_and_counts() {
    let created = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&created);
    let (url, log) = spawn_stub(move |method: &Method, path: &str, _: &Value| {
        match (method.as_str(), path) {
            ("GET", "/collections/docs") if !flag.load(Ordering::SeqCst) => {
                (StatusCode::NOT_FOUND, json!({ "status": { "error": "not found" } }))
            }
            ("GET", "/collections/docs") => (StatusCode::OK, json!({ "result": {} })),
            ("PUT", "/collections/docs") => {
                flag.store(true, Ordering::SeqCst);
                (StatusCode::OK, json!({ "result": true }))
            }
            ("PUT", "/collections/docs/points") => {
                (StatusCode::OK, json!({ "result": { "status": "completed" } }))
            }
            ("POST", "/collections/docs/points/search") => (
                StatusCode::OK,
                json!({ "result": [
                    { "id": "p1", "score": 0.9, "payload": { "text": "aws" }, "vector": [1.0, 0.0] }
                ] }),
            ),
            ("POST", "/collections/docs/points/count") => {
                (StatusCode::OK, json!({ "result": { "count": 1 } }))
            }
            _ => (StatusCode::NOT_FOUND, json!({})),
        }
    })
    .await;
    let client = QdrantClient::new(QdrantConfig {
        url,
        collection: "docs".into(),
        api_key: Some("secret".into()),
    });

    assert!(!client.collection_exists().await.unwrap());
    client.ensure_collection(2).await.unwrap();
    client.ensure_collection(2).await.unwrap();
    assert!(created.load(Ordering::SeqCst));

    client
        .upsert(vec![QdrantPoint {
            id: "p1".into(),
            vector: vec![1.0, 0.0],
            payload: HashMap::from([("text".to_string(), json!("aws"))]),
        }])
        .await
        .unwrap();
    let hits = client.search(vec![1.0, 0.0], 5, None).await.unwrap();
    assert_eq!(hits.result.len(), 1);
    assert_eq!(hits.result[0].vector.as_deref(), Some(&[1.0f32, 0.0][..]));
    assert_eq!(client.count().await.unwrap(), 1);

    let seen = log.lock().unwrap().clone();
    let creates: Vec<_> = seen
        .iter()
        .filter(|s| s.method == Method::PUT && s.path == "/collections/docs")
        .collect();
    assert_eq!(creates.len(), 1);
    assert_eq!(
        creates[0].body,
        json!({ "vectors": { "size": 2, "distance": "Cosine" } })
    );
    assert!(seen.iter().all(|s| s.auth.as_deref() == Some("secret")));

    let upsert = seen
        .iter()
        .find(|s| s.path == "/collections/docs/points")
        .unwrap();
    assert_eq!(upsert.query.as_deref(), Some("wait=true"));
    assert_eq!(upsert.body["points"][0]["payload"]["text"], "aws");

    let search = seen
        .iter()
        .find(|s| s.path.ends_with("/points/search"))
        .unwrap();
    assert_eq!(search.body["limit"], 5);
    assert_eq!(search.body["with_payload"], true);
    assert_eq!(search.body["with_vector"], true);
    assert!(search.body.get("filter").is_none());
}
