//! HTTP surfaces of the chatbot: the question-answering API and the web front end.
pub mod api;
pub mod logging;
pub mod web;

use tokio::net::TcpListener;

/// Binds `host:port`, falling back to an OS-assigned port on the same host when
/// the requested one is unavailable.
pub async fn bind_with_fallback(host: &str, port: u16) -> anyhow::Result<TcpListener> {
    match TcpListener::bind((host, port)).await {
        Ok(listener) => Ok(listener),
        Err(e) => {
            let listener = TcpListener::bind((host, 0)).await?;
            let actual = listener.local_addr()?.port();
            tracing::warn!(
                "Port {} unavailable ({}), using alternative port: {}",
                port,
                e,
                actual
            );
            Ok(listener)
        }
    }
}
