//! Knowledge-base search exposed to the agent as a tool.

use super::{Tool, ToolResult};
use crate::rag::{EmbeddingProvider, RetrievalIndex, render_passages};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

pub struct RagSearchTool {
    index: Arc<RetrievalIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    k: usize,
}

impl RagSearchTool {
    pub fn new(
        index: Arc<RetrievalIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        k: usize,
    ) -> Self {
        Self { index, embedder, k }
    }
}

#[async_trait]
impl Tool for RagSearchTool {
    fn name(&self) -> &str {
        "rag_search"
    }

    fn description(&self) -> &str {
        "Search the local knowledge base and return the most relevant passages for a query."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look up in the knowledge base"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let Some(query) = args.get("query").and_then(Value::as_str) else {
            return Ok(ToolResult::err("rag_search requires a 'query' string"));
        };

        let hits = self.index.search(self.embedder.as_ref(), query, self.k).await?;
        if hits.is_empty() {
            return Ok(ToolResult::ok("No matching passages in the knowledge base."));
        }
        Ok(ToolResult::ok(render_passages(&hits)))
    }
}
