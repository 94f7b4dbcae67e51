//! Demo resource service: authenticated lookups of static records.
//!
//! This is the remote API the tool bridge targets in the demo setup. It
//! also serves its own machine-readable description at `/openapi.json`, so
//! a bridge pointed at it can discover the two operations.

use crate::auth::CredentialGuard;
use anyhow::Result;
use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Clone)]
pub struct ResourceState {
    pub guard: Arc<CredentialGuard>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub user_id: String,
    pub username: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub item_id: String,
    pub name: String,
    pub description: Option<String>,
}

/// Run the resource service on `host:port` with the given shared secret.
pub async fn run_resource_api(host: &str, port: u16, shared_secret: &str) -> Result<()> {
    let state = ResourceState {
        guard: Arc::new(CredentialGuard::new(shared_secret)),
    };
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_with_listener(listener, state).await
}

/// Serve from a pre-bound listener (also the test seam).
pub async fn serve_with_listener(
    listener: tokio::net::TcpListener,
    state: ResourceState,
) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "resource API listening");

    let app = Router::new()
        .route("/", get(handle_root))
        .route("/openapi.json", get(handle_openapi))
        .route("/users/{user_id}", get(handle_user))
        .route("/items/{item_id}", get(handle_item))
        .with_state(state);

    axum::serve(listener, app).await?;
    Ok(())
}

/// GET / — unauthenticated liveness/info.
async fn handle_root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Welcome to the resource API. See /openapi.json for the schema."
    }))
}

fn check_credential(state: &ResourceState, headers: &HeaderMap) -> Option<Response> {
    let presented = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if state.guard.verify(presented) {
        None
    } else {
        let err = serde_json::json!({"error": "Could not validate credentials"});
        Some((StatusCode::FORBIDDEN, Json(err)).into_response())
    }
}

/// GET /users/{user_id}
async fn handle_user(
    State(state): State<ResourceState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Some(rejection) = check_credential(&state, &headers) {
        return rejection;
    }

    match lookup_user(&user_id) {
        Some(user) => Json(user).into_response(),
        None => {
            let err = serde_json::json!({"error": "User not found"});
            (StatusCode::NOT_FOUND, Json(err)).into_response()
        }
    }
}

/// GET /items/{item_id}
async fn handle_item(
    State(state): State<ResourceState>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Some(rejection) = check_credential(&state, &headers) {
        return rejection;
    }

    match lookup_item(&item_id) {
        Some(item) => Json(item).into_response(),
        None => {
            let err = serde_json::json!({"error": "Item not found"});
            (StatusCode::NOT_FOUND, Json(err)).into_response()
        }
    }
}

fn lookup_user(user_id: &str) -> Option<UserInfo> {
    match user_id {
        "user123" => Some(UserInfo {
            user_id: "user123".into(),
            username: "Alice".into(),
            roles: vec!["admin".into(), "user".into()],
        }),
        "user456" => Some(UserInfo {
            user_id: "user456".into(),
            username: "Bob".into(),
            roles: vec!["user".into()],
        }),
        _ => None,
    }
}

fn lookup_item(item_id: &str) -> Option<Item> {
    match item_id {
        "item_abc" => Some(Item {
            item_id: "item_abc".into(),
            name: "Laptop".into(),
            description: Some("A powerful machine".into()),
        }),
        "item_def" => Some(Item {
            item_id: "item_def".into(),
            name: "Mouse".into(),
            description: Some("An ergonomic mouse".into()),
        }),
        _ => None,
    }
}

/// GET /openapi.json — hand-written description of the two operations, in
/// the shape a bridge executable expects to consume.
async fn handle_openapi() -> impl IntoResponse {
    Json(serde_json::json!({
        "openapi": "3.1.0",
        "info": {
            "title": "Resource API",
            "description": "Demo API with X-API-Key authorization.",
            "version": "1.0.0"
        },
        "paths": {
            "/users/{user_id}": {
                "get": {
                    "operationId": "get_user_info",
                    "summary": "Fetch a user record by id",
                    "parameters": [{
                        "name": "user_id",
                        "in": "path",
                        "required": true,
                        "schema": {"type": "string"}
                    }],
                    "responses": {
                        "200": {"description": "The user record"},
                        "404": {"description": "User not found"}
                    }
                }
            },
            "/items/{item_id}": {
                "get": {
                    "operationId": "get_item_info",
                    "summary": "Fetch an item record by id",
                    "parameters": [{
                        "name": "item_id",
                        "in": "path",
                        "required": true,
                        "schema": {"type": "string"}
                    }],
                    "responses": {
                        "200": {"description": "The item record"},
                        "404": {"description": "Item not found"}
                    }
                }
            }
        },
        "components": {
            "securitySchemes": {
                "ApiKeyHeader": {"type": "apiKey", "in": "header", "name": "X-API-Key"}
            }
        },
        "security": [{"ApiKeyHeader": []}]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_state() -> ResourceState {
        ResourceState {
            guard: Arc::new(CredentialGuard::new("resource-secret")),
        }
    }

    fn headers_with_key(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-API-Key", key.parse().unwrap());
        headers
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn known_user_returns_record() {
        let response = handle_user(
            State(make_state()),
            Path("user123".to_string()),
            headers_with_key("resource-secret"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["user_id"], "user123");
        assert_eq!(body["username"], "Alice");
        assert_eq!(body["roles"], serde_json::json!(["admin", "user"]));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let response = handle_user(
            State(make_state()),
            Path("unknown".to_string()),
            headers_with_key("resource-secret"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_key_is_forbidden() {
        let response = handle_user(
            State(make_state()),
            Path("user123".to_string()),
            HeaderMap::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Could not validate credentials");
    }

    #[tokio::test]
    async fn wrong_key_is_forbidden() {
        let response = handle_item(
            State(make_state()),
            Path("item_abc".to_string()),
            headers_with_key("not-the-secret"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn known_item_returns_record() {
        let response = handle_item(
            State(make_state()),
            Path("item_def".to_string()),
            headers_with_key("resource-secret"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["name"], "Mouse");
    }

    #[tokio::test]
    async fn openapi_lists_both_operations() {
        let response = handle_openapi().await.into_response();
        let body = body_json(response).await;
        assert!(body["paths"]["/users/{user_id}"]["get"]["operationId"] == "get_user_info");
        assert!(body["paths"]["/items/{item_id}"]["get"]["operationId"] == "get_item_info");
    }
}
