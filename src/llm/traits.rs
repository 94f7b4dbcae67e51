use super::response::{ContentBlock, MessageRole, ProviderMessage, ProviderResponse};
use crate::tools::ToolSpec;
use async_trait::async_trait;

/// Concatenate messages into a single text string for providers that don't
/// support structured messages. Tool blocks are skipped.
pub fn messages_to_text(messages: &[ProviderMessage]) -> String {
    messages
        .iter()
        .filter_map(|msg| {
            let role_label = match msg.role {
                MessageRole::User => "User:",
                MessageRole::Assistant => "Assistant:",
                MessageRole::System => "System:",
            };

            let text_parts: Vec<&str> = msg
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. } => None,
                })
                .collect();

            if text_parts.is_empty() {
                None
            } else {
                Some(format!("{} {}", role_label, text_parts.join(" ")))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Chat with structured messages and tool support. The model may answer
    /// with tool-use blocks, which the caller is expected to execute and
    /// feed back as tool results.
    async fn chat_with_tools(
        &self,
        system_prompt: Option<&str>,
        messages: &[ProviderMessage],
        tools: &[ToolSpec],
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<ProviderResponse>;

    /// Whether this provider supports native structured tool calling.
    fn supports_tool_calling(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_to_text_concatenates_text_blocks() {
        let messages = vec![
            ProviderMessage::user("Hello"),
            ProviderMessage::assistant("Hi there"),
        ];
        assert_eq!(messages_to_text(&messages), "User: Hello\nAssistant: Hi there");
    }

    #[test]
    fn messages_to_text_skips_tool_blocks() {
        let messages = vec![ProviderMessage {
            role: MessageRole::Assistant,
            content: vec![
                ContentBlock::Text {
                    text: "checking".into(),
                },
                ContentBlock::ToolUse {
                    id: "toolu_1".into(),
                    name: "rag_search".into(),
                    input: serde_json::json!({"query": "x"}),
                },
            ],
        }];
        assert_eq!(messages_to_text(&messages), "Assistant: checking");
    }

    #[test]
    fn messages_to_text_empty_input() {
        assert_eq!(messages_to_text(&[]), "");
    }
}
