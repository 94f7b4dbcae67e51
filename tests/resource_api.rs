use helmsman::auth::CredentialGuard;
use helmsman::resource::{ResourceState, serve_with_listener};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

struct ResourceTestServer {
    port: u16,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl ResourceTestServer {
    async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("ephemeral listener should bind");
        let port = listener.local_addr().unwrap().port();

        let state = ResourceState {
            guard: Arc::new(CredentialGuard::new("resource-secret")),
        };
        let handle = tokio::spawn(async move { serve_with_listener(listener, state).await });

        // The root route is unauthenticated; poll it for readiness.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        for _ in 0..80 {
            if matches!(
                client.get(format!("http://127.0.0.1:{port}/")).send().await,
                Ok(resp) if resp.status() == StatusCode::OK
            ) {
                return Self { port, handle };
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("resource API did not become ready on port {port}");
    }

    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }
}

impl Drop for ResourceTestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn root_is_unauthenticated_info() {
    let server = ResourceTestServer::start().await;
    let response = reqwest::get(server.url("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("resource API"));
}

#[tokio::test]
async fn known_user_with_correct_key_returns_record() {
    let server = ResourceTestServer::start().await;
    let client = reqwest::Client::new();

    let response = client
        .get(server.url("/users/user123"))
        .header("X-API-Key", "resource-secret")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["user_id"], "user123");
    assert_eq!(body["username"], "Alice");
    assert_eq!(body["roles"], serde_json::json!(["admin", "user"]));
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let server = ResourceTestServer::start().await;
    let client = reqwest::Client::new();

    let response = client
        .get(server.url("/users/unknown"))
        .header("X-API-Key", "resource-secret")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_key_is_rejected() {
    let server = ResourceTestServer::start().await;
    let response = reqwest::get(server.url("/users/user123")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Could not validate credentials");
}

#[tokio::test]
async fn item_lookup_round_trip() {
    let server = ResourceTestServer::start().await;
    let client = reqwest::Client::new();

    let found = client
        .get(server.url("/items/item_abc"))
        .header("X-API-Key", "resource-secret")
        .send()
        .await
        .unwrap();
    assert_eq!(found.status(), StatusCode::OK);
    let body: serde_json::Value = found.json().await.unwrap();
    assert_eq!(body["name"], "Laptop");

    let missing = client
        .get(server.url("/items/item_zzz"))
        .header("X-API-Key", "resource-secret")
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn openapi_description_is_served() {
    let server = ResourceTestServer::start().await;
    let response = reqwest::get(server.url("/openapi.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body["paths"]["/users/{user_id}"]["get"]["operationId"],
        "get_user_info"
    );
}
