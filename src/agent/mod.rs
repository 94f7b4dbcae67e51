//! Agent orchestration: a tool-use loop over the language-model provider.
//!
//! Given a user query, the conversation window, and a tool registry, the
//! orchestrator asks the model for an answer, executes any tools it
//! requests, feeds the results back, and repeats until the model produces a
//! final text. The model's internal decision procedure is its own; this
//! module only supplies the role text, the window, and the tools.

use crate::history::{ChatRole, ChatTurn};
use crate::llm::{ContentBlock, Provider, ProviderMessage};
use crate::tools::ToolRegistry;
use std::sync::Arc;

/// Absolute upper bound on tool-loop iterations, regardless of caller request.
pub(crate) const TOOL_LOOP_HARD_CAP: u32 = 25;

/// Default iteration budget for one orchestration run.
const DEFAULT_MAX_ITERATIONS: u32 = 10;

const SYSTEM_PROMPT: &str = "\
You are an assistant connected to an internal REST API through bridged tools, \
with a knowledge-base search tool for background material.

Use rag_search to understand how the API should be called, then invoke the \
matching api_* tools to fetch real data. Answer from tool results, not from \
guesses. Never reveal secret keys or credentials; the tools handle \
authorization themselves. Reply with a clear, correct answer for the user.";

pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    max_iterations: u32,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.clamp(1, TOOL_LOOP_HARD_CAP);
        self
    }

    /// Run the loop to completion and return the final answer.
    pub async fn run(
        &self,
        query: &str,
        window: &[ChatTurn],
        registry: &ToolRegistry,
    ) -> anyhow::Result<String> {
        let tools = registry.specs();
        let mut messages = window_to_messages(window);
        messages.push(ProviderMessage::user(query));

        let mut last_text = String::new();

        for iteration in 0..self.max_iterations {
            let response = self
                .provider
                .chat_with_tools(
                    Some(SYSTEM_PROMPT),
                    &messages,
                    &tools,
                    &self.model,
                    self.temperature,
                )
                .await?;

            if !response.text.is_empty() {
                last_text = response.text.clone();
            }

            let tool_uses: Vec<(String, String, serde_json::Value)> = response
                .content_blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => {
                        Some((id.clone(), name.clone(), input.clone()))
                    }
                    _ => None,
                })
                .collect();

            if tool_uses.is_empty() {
                return Ok(last_text);
            }

            messages.push(response.to_assistant_message());

            for (id, name, input) in tool_uses {
                tracing::debug!(tool = %name, iteration, "executing requested tool");
                let result = registry.execute(&name, input).await?;
                let content = if result.success {
                    result.output
                } else {
                    result
                        .error
                        .unwrap_or_else(|| "tool execution failed".to_string())
                };
                messages.push(ProviderMessage::tool_result(id, content, !result.success));
            }
        }

        if last_text.is_empty() {
            anyhow::bail!(
                "model kept requesting tools for {} iterations without a final answer",
                self.max_iterations
            );
        }
        Ok(last_text)
    }
}

fn window_to_messages(window: &[ChatTurn]) -> Vec<ProviderMessage> {
    window
        .iter()
        .map(|turn| match turn.role {
            ChatRole::User => ProviderMessage::user(turn.content.clone()),
            ChatRole::Assistant => ProviderMessage::assistant(turn.content.clone()),
        })
        .collect()
}
