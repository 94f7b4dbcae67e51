//! MCP tool bridge: exposes a remote API's operations as callable tools.
//!
//! One bridge per request. The bridge spawns the configured executable over
//! stdio, hands it the remote API's base URL and description file, and puts
//! the caller's credential into the child environment — a side channel the
//! model never sees. The start/stop pairing is the one real resource-lifetime
//! contract in this crate: callers must invoke [`ToolBridge::shutdown`] on
//! every exit path, or the child process leaks.

pub mod proxy;

pub use proxy::BridgedTool;

use anyhow::{Context, Result, anyhow};
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use rmcp::{ServiceExt, model::CallToolRequestParams};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::RwLock;

/// Environment variable the bridge executable reads the credential from.
const CREDENTIAL_ENV_VAR: &str = "API_KEY";

type McpService = RunningService<RoleClient, ()>;

/// Everything needed to start a bridge, minus the per-request credential.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Path to the bridge executable.
    pub command: String,
    /// Base URL of the remote API the bridge talks to.
    pub remote_api_url: String,
    /// Local machine-readable description of the remote API.
    pub api_spec_path: String,
    /// Per-tool-call timeout in seconds.
    pub call_timeout_secs: u64,
}

/// A running stdio MCP connection to the bridge executable.
pub struct ToolBridge {
    service: RwLock<Option<McpService>>,
    call_timeout_secs: u64,
}

impl ToolBridge {
    /// Spawn the bridge process and complete the MCP handshake.
    ///
    /// The credential travels only in the child environment. If the spawn or
    /// the handshake fails, no usable bridge state exists and nothing needs
    /// releasing.
    pub async fn connect(settings: &BridgeSettings, credential: &str) -> Result<Self> {
        let service = ()
            .serve(TokioChildProcess::new(
                Command::new(&settings.command).configure(|cmd| {
                    cmd.arg("--base-url");
                    cmd.arg(&settings.remote_api_url);
                    cmd.arg(&settings.api_spec_path);
                    cmd.env(CREDENTIAL_ENV_VAR, credential);
                }),
            )?)
            .await
            .with_context(|| {
                format!(
                    "failed to start tool bridge '{}' over stdio",
                    settings.command
                )
            })?;

        Ok(Self {
            service: RwLock::new(Some(service)),
            call_timeout_secs: settings.call_timeout_secs,
        })
    }

    /// Discover the remote API's operations.
    pub async fn list_tools(&self) -> Result<Vec<rmcp::model::Tool>> {
        let guard = self.service.read().await;
        let service = guard
            .as_ref()
            .ok_or_else(|| anyhow!("tool bridge is not active"))?;

        let tools = service
            .list_all_tools()
            .await
            .context("failed to list tools from the bridge")?;
        Ok(tools)
    }

    /// Invoke one bridged operation, bounded by the configured timeout.
    pub async fn call_tool(&self, tool_name: &str, args: serde_json::Value) -> Result<String> {
        let arguments = match args {
            serde_json::Value::Object(object) => Some(object),
            serde_json::Value::Null => None,
            _ => {
                return Err(anyhow!(
                    "bridge tool '{tool_name}' requires JSON object arguments"
                ));
            }
        };

        let request = CallToolRequestParams {
            meta: None,
            name: tool_name.to_string().into(),
            arguments,
            task: None,
        };

        let guard = self.service.read().await;
        let service = guard
            .as_ref()
            .ok_or_else(|| anyhow!("tool bridge is not active"))?;

        let result = tokio::time::timeout(
            Duration::from_secs(self.call_timeout_secs),
            service.call_tool(request),
        )
        .await
        .map_err(|_| {
            anyhow!(
                "bridge tool '{}' timed out after {}s",
                tool_name,
                self.call_timeout_secs
            )
        })?
        .with_context(|| format!("bridge tool '{tool_name}' call failed"))?;

        Ok(render_contents(&result.content))
    }

    /// Stop the bridge and reap the child process. Idempotent: the service
    /// slot is taken, so a second call is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        let service = self.service.write().await.take();
        if let Some(service) = service {
            service
                .cancel()
                .await
                .context("failed to shut down the tool bridge")?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn disconnected_for_test() -> Self {
        Self {
            service: RwLock::new(None),
            call_timeout_secs: 30,
        }
    }
}

/// Discover the bridged operations and wrap each as a [`BridgedTool`].
pub async fn bridged_tools(bridge: &Arc<ToolBridge>) -> Result<Vec<BridgedTool>> {
    let tools = bridge.list_tools().await?;
    Ok(tools
        .into_iter()
        .map(|tool| {
            BridgedTool::new(
                tool.name.into_owned(),
                tool.description
                    .map_or_else(String::new, std::borrow::Cow::into_owned),
                serde_json::Value::Object(tool.input_schema.as_ref().clone()),
                Arc::clone(bridge),
            )
        })
        .collect())
}

/// Flatten MCP content items into the plain text handed back to the model.
fn render_contents(contents: &[rmcp::model::Content]) -> String {
    use rmcp::model::RawContent;

    contents
        .iter()
        .map(|content| match &content.raw {
            RawContent::Text(text) => text.text.clone(),
            RawContent::Image(image) => format!("[Image: {}]", image.mime_type),
            RawContent::Audio(audio) => format!("[Audio: {}]", audio.mime_type),
            RawContent::Resource(embedded) => {
                let uri = match &embedded.resource {
                    rmcp::model::ResourceContents::TextResourceContents { uri, .. }
                    | rmcp::model::ResourceContents::BlobResourceContents { uri, .. } => uri,
                };
                format!("[Resource: {uri}]")
            }
            RawContent::ResourceLink(link) => format!("[Resource: {}]", link.uri),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Make sure a local machine-readable description of the remote API exists,
/// fetching `<base>/openapi.json` if the file is missing. Runs once at
/// gateway startup.
pub async fn ensure_api_description(remote_api_url: &str, path: &Path) -> Result<()> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(());
    }

    let spec_url = format!("{}/openapi.json", remote_api_url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());

    let response = client
        .get(&spec_url)
        .send()
        .await
        .with_context(|| format!("fetch API description from {spec_url}"))?;
    if !response.status().is_success() {
        anyhow::bail!(
            "API description fetch failed with status {}",
            response.status()
        );
    }

    let spec: serde_json::Value = response
        .json()
        .await
        .context("API description was not valid JSON")?;

    tracing::info!(path = %path.display(), "writing fetched API description");
    tokio::fs::write(path, serde_json::to_vec_pretty(&spec)?)
        .await
        .with_context(|| format!("write API description to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn connect_fails_for_missing_executable() {
        let settings = BridgeSettings {
            command: "/nonexistent/bridge-binary".into(),
            remote_api_url: "http://127.0.0.1:8001".into(),
            api_spec_path: "openapi.json".into(),
            call_timeout_secs: 5,
        };
        let result = ToolBridge::connect(&settings, "secret").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn calls_against_inactive_bridge_error() {
        let bridge = ToolBridge::disconnected_for_test();
        let err = bridge
            .call_tool("get_user_info", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not active"));
        assert!(bridge.list_tools().await.is_err());
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_when_inactive() {
        let bridge = ToolBridge::disconnected_for_test();
        assert!(bridge.shutdown().await.is_ok());
        assert!(bridge.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn non_object_arguments_are_rejected() {
        let bridge = ToolBridge::disconnected_for_test();
        let err = bridge
            .call_tool("get_user_info", serde_json::json!([1, 2]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("JSON object arguments"));
    }

    #[test]
    fn render_contents_joins_text_items() {
        let contents = vec![
            rmcp::model::Content::text("line one"),
            rmcp::model::Content::text("line two"),
        ];
        assert_eq!(render_contents(&contents), "line one\nline two");
    }

    #[tokio::test]
    async fn ensure_api_description_fetches_when_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/openapi.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "openapi": "3.1.0",
                "paths": {"/users/{user_id}": {}}
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let spec_path = dir.path().join("openapi.json");
        ensure_api_description(&server.uri(), &spec_path)
            .await
            .unwrap();

        let written = std::fs::read_to_string(&spec_path).unwrap();
        assert!(written.contains("3.1.0"));
    }

    #[tokio::test]
    async fn ensure_api_description_skips_existing_file() {
        let dir = TempDir::new().unwrap();
        let spec_path = dir.path().join("openapi.json");
        std::fs::write(&spec_path, "{\"local\": true}").unwrap();

        // No server running — this only passes if nothing is fetched.
        ensure_api_description("http://127.0.0.1:1", &spec_path)
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&spec_path).unwrap(),
            "{\"local\": true}"
        );
    }

    #[tokio::test]
    async fn ensure_api_description_surfaces_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/openapi.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let result = ensure_api_description(&server.uri(), &dir.path().join("spec.json")).await;
        assert!(result.is_err());
    }
}
