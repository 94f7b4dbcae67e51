//! OpenAI chat-completions provider with function-tool support.

use super::response::{ContentBlock, MessageRole, ProviderMessage, ProviderResponse, StopReason};
use super::traits::Provider;
use crate::tools::ToolSpec;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct OpenAiProvider {
    client: Client,
    completions_url: String,
    /// Pre-computed `"Bearer <key>"` header value.
    auth_header: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    r#type: &'static str,
    function: WireToolDefinition,
}

#[derive(Debug, Serialize)]
struct WireToolDefinition {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    r#type: String,
    function: WireToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

impl OpenAiProvider {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(10))
                .pool_max_idle_per_host(10)
                .build()
                .unwrap_or_else(|_| Client::new()),
            completions_url: format!("{base}/v1/chat/completions"),
            auth_header: format!("Bearer {api_key}"),
        }
    }

    fn text_message(role: &'static str, content: String) -> WireMessage {
        WireMessage {
            role,
            content: Some(content),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Flatten one structured message into the wire shape. An assistant
    /// message may carry tool calls; tool results become `role: "tool"`
    /// messages keyed by the originating call id.
    fn map_message(message: &ProviderMessage) -> Vec<WireMessage> {
        let mut text_parts = Vec::new();
        let mut assistant_tool_calls = Vec::new();
        let mut tool_messages = Vec::new();

        for block in &message.content {
            match block {
                ContentBlock::Text { text } => text_parts.push(text.clone()),
                ContentBlock::ToolUse { id, name, input } => {
                    assistant_tool_calls.push(WireToolCall {
                        id: id.clone(),
                        r#type: "function".to_string(),
                        function: WireToolCallFunction {
                            name: name.clone(),
                            arguments: input.to_string(),
                        },
                    });
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error: _,
                } => {
                    tool_messages.push(WireMessage {
                        role: "tool",
                        content: Some(content.clone()),
                        tool_call_id: Some(tool_use_id.clone()),
                        tool_calls: None,
                    });
                }
            }
        }

        let text_content = if text_parts.is_empty() {
            None
        } else {
            Some(text_parts.join("\n"))
        };

        let mut messages = Vec::new();
        match message.role {
            MessageRole::Assistant => {
                if text_content.is_some() || !assistant_tool_calls.is_empty() {
                    messages.push(WireMessage {
                        role: "assistant",
                        content: text_content,
                        tool_call_id: None,
                        tool_calls: if assistant_tool_calls.is_empty() {
                            None
                        } else {
                            Some(assistant_tool_calls)
                        },
                    });
                }
            }
            MessageRole::User => {
                if let Some(content) = text_content {
                    messages.push(Self::text_message("user", content));
                }
            }
            MessageRole::System => {
                if let Some(content) = text_content {
                    messages.push(Self::text_message("system", content));
                }
            }
        }

        messages.extend(tool_messages);
        messages
    }

    fn build_request(
        system_prompt: Option<&str>,
        messages: &[ProviderMessage],
        tools: &[ToolSpec],
        model: &str,
        temperature: f64,
    ) -> ChatRequest {
        let mut wire_messages = Vec::new();

        if let Some(sys) = system_prompt {
            wire_messages.push(Self::text_message("system", sys.to_string()));
        }
        for message in messages {
            wire_messages.extend(Self::map_message(message));
        }

        let wire_tools = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|tool| WireTool {
                        r#type: "function",
                        function: WireToolDefinition {
                            name: tool.name.clone(),
                            description: tool.description.clone(),
                            parameters: tool.parameters.clone(),
                        },
                    })
                    .collect(),
            )
        };

        ChatRequest {
            model: model.to_string(),
            messages: wire_messages,
            temperature,
            tools: wire_tools,
        }
    }

    fn map_finish_reason(finish_reason: Option<&str>) -> StopReason {
        match finish_reason {
            Some("stop") => StopReason::EndTurn,
            Some("tool_calls") => StopReason::ToolUse,
            Some("length") => StopReason::MaxTokens,
            Some(_) | None => StopReason::Error,
        }
    }

    fn parse_tool_calls(tool_calls: Option<Vec<WireToolCall>>) -> anyhow::Result<Vec<ContentBlock>> {
        tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tool_call| {
                let input: Value = serde_json::from_str(&tool_call.function.arguments)
                    .with_context(|| {
                        format!(
                            "tool call arguments were not valid JSON for {}",
                            tool_call.function.name
                        )
                    })?;
                Ok(ContentBlock::ToolUse {
                    id: tool_call.id,
                    name: tool_call.function.name,
                    input,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn chat_with_tools(
        &self,
        system_prompt: Option<&str>,
        messages: &[ProviderMessage],
        tools: &[ToolSpec],
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<ProviderResponse> {
        let request = Self::build_request(system_prompt, messages, tools, model, temperature);

        let response = self
            .client
            .post(&self.completions_url)
            .header("Authorization", &self.auth_header)
            .json(&request)
            .send()
            .await
            .context("chat completion request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("chat completion API error {}", response.status());
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("chat completion response decode failed")?;
        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no choices in chat completion response"))?;

        let text = choice.message.content.unwrap_or_default();
        let mut content_blocks = Self::parse_tool_calls(choice.message.tool_calls)?;
        if !text.is_empty() {
            content_blocks.insert(0, ContentBlock::Text { text: text.clone() });
        }

        Ok(ProviderResponse {
            text,
            content_blocks,
            stop_reason: Some(Self::map_finish_reason(choice.finish_reason.as_deref())),
        })
    }

    fn supports_tool_calling(&self) -> bool {
        true
    }
}
