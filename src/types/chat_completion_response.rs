use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{MessageRole, Usage};

/// The assistant message inside a non-streaming choice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseMessage {
    pub role: MessageRole,

    /// Text content; absent when the model only called tools.
    #[serde(default)]
    pub content: Option<String>,

    /// Raw tool calls, carried but not executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
}

/// One completion alternative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,

    pub message: ResponseMessage,

    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Body of a non-streaming `chat/completions` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub model: String,

    /// Unix timestamp of creation.
    #[serde(default)]
    pub created: u64,

    pub choices: Vec<Choice>,

    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// Content of the first choice, or empty.
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .unwrap_or("")
    }

    /// Finish reason of the first choice.
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.finish_reason.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_deserialization() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "qwen3",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "<think>x</think>Hi"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 5, "total_tokens": 8}
        }))
        .unwrap();
        assert_eq!(response.content(), "<think>x</think>Hi");
        assert_eq!(response.finish_reason(), Some("stop"));
        assert_eq!(response.usage, Some(Usage::new(3, 5)));
    }

    #[test]
    fn null_content_reads_as_empty() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {"role": "assistant", "content": null, "tool_calls": [{"id": "1"}]},
                "finish_reason": "tool_calls"
            }]
        }))
        .unwrap();
        assert_eq!(response.content(), "");
        assert!(response.choices[0].message.tool_calls.is_some());
    }
}
