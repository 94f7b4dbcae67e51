//! Bridged remote-API operations as agent tools.

use super::ToolBridge;
use crate::tools::{Tool, ToolResult};
use async_trait::async_trait;
use std::sync::Arc;

pub struct BridgedTool {
    /// The operation name the bridge knows it by.
    upstream_name: String,
    /// The namespaced name offered to the model.
    namespaced_name: String,
    description: String,
    parameters_schema: serde_json::Value,
    bridge: Arc<ToolBridge>,
}

impl BridgedTool {
    pub fn new(
        upstream_name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: serde_json::Value,
        bridge: Arc<ToolBridge>,
    ) -> Self {
        let upstream_name = upstream_name.into();
        let namespaced_name = format!("api_{upstream_name}");
        Self {
            upstream_name,
            namespaced_name,
            description: description.into(),
            parameters_schema,
            bridge,
        }
    }

    pub fn upstream_name(&self) -> &str {
        &self.upstream_name
    }
}

#[async_trait]
impl Tool for BridgedTool {
    fn name(&self) -> &str {
        &self.namespaced_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.parameters_schema.clone()
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        // A failed remote call is reported to the model as a failed result,
        // not bubbled as a request error.
        match self.bridge.call_tool(&self.upstream_name, args).await {
            Ok(output) => Ok(ToolResult::ok(output)),
            Err(error) => Ok(ToolResult::err(error.to_string())),
        }
    }
}
