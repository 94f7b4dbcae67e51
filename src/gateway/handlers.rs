use super::AppState;
use crate::agent::Orchestrator;
use crate::bridge::{ToolBridge, bridged_tools};
use crate::history::{ChatRole, ChatTurn};
use crate::tools::{RagSearchTool, ToolRegistry};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use std::convert::Infallible;
use std::sync::Arc;

/// Header carrying the caller's credential, forwarded to the bridge.
const API_KEY_HEADER: &str = "X-API-Key";

/// Body of `POST /chat/stream`.
#[derive(serde::Deserialize)]
pub struct ChatStreamBody {
    pub client_id: String,
    pub message: String,
}

/// Why one orchestration run failed, mapped to a response status.
enum OrchestrationFailure {
    /// The bridge process could not be started or its tools listed.
    Bridge(anyhow::Error),
    /// The model, a tool, or the embedding call failed.
    Upstream(anyhow::Error),
    /// The configured orchestration deadline passed.
    Timeout(u64),
}

/// GET /health — always public (no secrets leaked)
pub(super) async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "ok",
        "indexed_chunks": state.index.len(),
        "history": state.history.health_check().await,
    });
    Json(body)
}

/// POST /chat/stream — authenticate, load history, orchestrate, stream,
/// having persisted the exchange first.
pub(super) async fn handle_chat_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatStreamBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    // ── Credential check (before any other work) ──
    let Some(credential) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) else {
        let err = serde_json::json!({"error": "X-API-Key header is required"});
        return (StatusCode::UNAUTHORIZED, Json(err)).into_response();
    };
    if !state.guard.verify(credential) {
        tracing::warn!("chat request rejected: invalid API key");
        let err = serde_json::json!({"error": "Invalid API key"});
        return (StatusCode::UNAUTHORIZED, Json(err)).into_response();
    }
    let credential = credential.to_string();

    // ── Parse body ──
    let Json(request) = match body {
        Ok(b) => b,
        Err(e) => {
            let err = serde_json::json!({
                "error": format!(
                    "Invalid JSON: {e}. Expected: {{\"client_id\": \"...\", \"message\": \"...\"}}"
                )
            });
            return (StatusCode::BAD_REQUEST, Json(err)).into_response();
        }
    };

    // ── Load the conversation window ──
    let window = match state
        .history
        .recent(&request.client_id, state.history_limit)
        .await
    {
        Ok(window) => window,
        Err(error) => {
            tracing::error!(%error, "failed to load chat history");
            let err = serde_json::json!({"error": "History lookup failed"});
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(err)).into_response();
        }
    };

    // ── Orchestrate on the worker pool so the accept loop stays free ──
    let request_id = uuid::Uuid::new_v4();
    let task_state = state.clone();
    let message = request.message.clone();
    let handle =
        tokio::spawn(
            async move { run_orchestration(task_state, credential, message, window).await },
        );

    let answer = match handle.await {
        Ok(Ok(answer)) => answer,
        Ok(Err(failure)) => return failure_response(&request_id, failure),
        Err(join_error) => {
            tracing::error!(%request_id, %join_error, "orchestration task failed");
            let err = serde_json::json!({"error": "Orchestration task failed"});
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(err)).into_response();
        }
    };

    // ── Persist both turns before streaming ──
    // A client that disconnects mid-stream loses presentation only; the
    // exchange is already durable.
    if let Err(error) = persist_exchange(&state, &request, &answer).await {
        tracing::error!(%request_id, %error, "failed to persist chat turns");
        let err = serde_json::json!({"error": "Failed to persist chat history"});
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(err)).into_response();
    }

    stream_answer(answer, state.stream_char_delay)
}

async fn persist_exchange(
    state: &AppState,
    request: &ChatStreamBody,
    answer: &str,
) -> anyhow::Result<()> {
    state
        .history
        .append(&request.client_id, ChatRole::User, &request.message)
        .await?;
    state
        .history
        .append(&request.client_id, ChatRole::Assistant, answer)
        .await?;
    Ok(())
}

/// One full agent run: per-request bridge, tool set, loop under a deadline.
///
/// The bridge is released on every path out of this function — success,
/// error, and timeout — before the result is returned.
async fn run_orchestration(
    state: AppState,
    credential: String,
    message: String,
    window: Vec<ChatTurn>,
) -> Result<String, OrchestrationFailure> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(RagSearchTool::new(
        Arc::clone(&state.index),
        Arc::clone(&state.embedder),
        state.search_k,
    )));

    let bridge = match &state.bridge {
        Some(settings) => match ToolBridge::connect(settings, &credential).await {
            Ok(bridge) => Some(Arc::new(bridge)),
            Err(error) => return Err(OrchestrationFailure::Bridge(error)),
        },
        None => None,
    };

    let run = async {
        if let Some(bridge) = &bridge {
            let tools = bridged_tools(bridge).await?;
            for tool in tools {
                registry.register(Arc::new(tool));
            }
        }

        let orchestrator = Orchestrator::new(
            Arc::clone(&state.provider),
            state.model.clone(),
            state.temperature,
        );
        orchestrator.run(&message, &window, &registry).await
    };

    let outcome = tokio::time::timeout(state.orchestration_timeout, run).await;

    if let Some(bridge) = &bridge
        && let Err(error) = bridge.shutdown().await
    {
        tracing::warn!(%error, "failed to shut down the tool bridge");
    }

    match outcome {
        Err(_elapsed) => Err(OrchestrationFailure::Timeout(
            state.orchestration_timeout.as_secs(),
        )),
        Ok(Ok(answer)) => Ok(answer),
        Ok(Err(error)) => Err(OrchestrationFailure::Upstream(error)),
    }
}

fn failure_response(request_id: &uuid::Uuid, failure: OrchestrationFailure) -> Response {
    match failure {
        OrchestrationFailure::Bridge(error) => {
            tracing::error!(%request_id, %error, "tool bridge failure");
            let err = serde_json::json!({"error": "Tool bridge unavailable"});
            (StatusCode::BAD_GATEWAY, Json(err)).into_response()
        }
        OrchestrationFailure::Upstream(error) => {
            tracing::error!(%request_id, %error, "orchestration failure");
            let err = serde_json::json!({"error": "Agent request failed"});
            (StatusCode::BAD_GATEWAY, Json(err)).into_response()
        }
        OrchestrationFailure::Timeout(secs) => {
            tracing::error!(%request_id, secs, "orchestration timed out");
            let err = serde_json::json!({"error": format!("Orchestration timed out after {secs}s")});
            (StatusCode::GATEWAY_TIMEOUT, Json(err)).into_response()
        }
    }
}

/// Emit the answer one character at a time with a fixed small delay — a
/// presentation choice, not backpressure. Every emission suspends, so a
/// dropped connection stops the stream without error.
fn stream_answer(answer: String, delay: std::time::Duration) -> Response {
    let stream = async_stream::stream! {
        for ch in answer.chars() {
            yield Ok::<_, Infallible>(ch.to_string());
            tokio::time::sleep(delay).await;
        }
    };

    let mut response = Response::new(Body::from_stream(stream));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
