//! Axum-based chat gateway.
//!
//! Startup builds every component explicitly — retrieval index, history
//! store, embedding and model clients — and hands them to the request
//! handlers through shared state. The index is built once and read-only
//! afterwards; the history store is append-only; both are safe to share
//! across concurrent requests.

mod handlers;

pub use handlers::ChatStreamBody;

use crate::auth::CredentialGuard;
use crate::bridge::{BridgeSettings, ensure_api_description};
use crate::config::Config;
use crate::history::HistoryStore;
use crate::llm::{OpenAiProvider, Provider};
use crate::rag::{EmbeddingProvider, NoopEmbedding, OpenAiEmbedding, RetrievalIndex};
use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, post},
};
use handlers::{handle_chat_stream, handle_health};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;

/// Maximum request body size (64KB) — prevents memory exhaustion.
pub const MAX_BODY_SIZE: usize = 65_536;

/// Shared state for all gateway handlers.
#[derive(Clone)]
pub struct AppState {
    pub guard: Arc<CredentialGuard>,
    pub history: Arc<HistoryStore>,
    pub index: Arc<RetrievalIndex>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub provider: Arc<dyn Provider>,
    /// `None` disables bridged tools; the agent then runs with retrieval only.
    pub bridge: Option<BridgeSettings>,
    pub model: String,
    pub temperature: f64,
    pub history_limit: usize,
    pub search_k: usize,
    pub orchestration_timeout: Duration,
    pub stream_char_delay: Duration,
}

/// Build all components from config and serve until shutdown.
pub async fn run_gateway(config: Config) -> Result<()> {
    config.validate()?;

    let bridge = config.mcp_command.as_ref().map(|command| BridgeSettings {
        command: command.clone(),
        remote_api_url: config.remote_api_url.clone(),
        api_spec_path: config.api_spec_path.display().to_string(),
        call_timeout_secs: config.bridge_call_timeout_secs,
    });

    if bridge.is_some()
        && let Err(error) = ensure_api_description(&config.remote_api_url, &config.api_spec_path).await
    {
        // Requests that need the bridge will fail with a clear error; the
        // gateway itself can still serve.
        tracing::warn!(%error, "could not fetch the remote API description at startup");
    }

    let embedder: Arc<dyn EmbeddingProvider> = if config.openai_api_key.is_empty() {
        tracing::warn!("no provider API key set; retrieval search is disabled");
        Arc::new(NoopEmbedding)
    } else {
        Arc::new(OpenAiEmbedding::new(
            &config.openai_base_url,
            &config.openai_api_key,
            &config.embedding_model,
            config.embedding_dimensions,
        ))
    };

    let index = Arc::new(
        RetrievalIndex::build(
            &config.docs_dir,
            config.chunk_size,
            config.chunk_overlap,
            embedder.as_ref(),
        )
        .await
        .context("build retrieval index")?,
    );
    tracing::info!(
        chunks = index.len(),
        docs_dir = %config.docs_dir.display(),
        "retrieval index built"
    );

    let history = Arc::new(
        HistoryStore::open(&config.db_path)
            .await
            .context("open history store")?,
    );

    let provider: Arc<dyn Provider> = Arc::new(OpenAiProvider::new(
        &config.openai_base_url,
        &config.openai_api_key,
    ));

    let state = AppState {
        guard: Arc::new(CredentialGuard::new(config.shared_secret.clone())),
        history,
        index,
        embedder,
        provider,
        bridge,
        model: config.model.clone(),
        temperature: config.temperature,
        history_limit: config.history_limit,
        search_k: config.search_k,
        orchestration_timeout: config.orchestration_timeout(),
        stream_char_delay: config.stream_char_delay(),
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    serve_with_listener(listener, state).await
}

/// Serve the gateway from a pre-bound listener (also the test seam).
pub async fn serve_with_listener(
    listener: tokio::net::TcpListener,
    state: AppState,
) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "chat gateway listening");
    tracing::info!("  POST /chat/stream");
    tracing::info!("  GET  /health");

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/chat/stream", post(handle_chat_stream))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE));

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_body_limit_is_64kb() {
        assert_eq!(MAX_BODY_SIZE, 65_536);
    }

    #[test]
    fn app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
