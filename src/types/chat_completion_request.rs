use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LlmConfig;
use crate::types::Message;

/// How the model may use the advertised tools.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// The model decides.
    Auto,

    /// The model must not call tools.
    None,
}

/// Body of a `POST chat/completions` request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionRequest {
    /// The model that will complete the conversation.
    pub model: String,

    /// The conversation so far.
    pub messages: Vec<Message>,

    /// Sampling temperature.
    pub temperature: f32,

    /// Upper bound on generated tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Nucleus sampling mass.
    pub top_p: f32,

    pub frequency_penalty: f32,

    pub presence_penalty: f32,

    /// Whether to stream the response as server-sent events.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,

    /// Tool definitions in function-calling format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

impl ChatCompletionRequest {
    /// Create a request carrying the sampling settings of `config`.
    pub fn from_config(config: &LlmConfig, messages: Vec<Message>) -> Self {
        Self {
            model: config.model.clone(),
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            frequency_penalty: config.frequency_penalty,
            presence_penalty: config.presence_penalty,
            stream: false,
            tools: None,
            tool_choice: None,
        }
    }

    /// Request a streamed response.
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Advertise tools; an empty list advertises nothing.
    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        if tools.is_empty() {
            self.tools = None;
            self.tool_choice = None;
        } else {
            self.tools = Some(tools);
            self.tool_choice = Some(ToolChoice::Auto);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    fn config() -> LlmConfig {
        let mut config = LlmConfig::new("http://localhost/v1", "qwen3", "key");
        config.temperature = 0.5;
        config
    }

    #[test]
    fn request_minimal() {
        let request = ChatCompletionRequest::from_config(&config(), vec![Message::user("hi")]);
        assert_eq!(
            to_value(&request).unwrap(),
            json!({
                "model": "qwen3",
                "messages": [{"role": "user", "content": "hi"}],
                "temperature": 0.5,
                "top_p": 1.0,
                "frequency_penalty": 0.0,
                "presence_penalty": 0.0
            })
        );
    }

    #[test]
    fn request_streaming_with_tools() {
        let tool = json!({"type": "function", "function": {"name": "clock"}});
        let request = ChatCompletionRequest::from_config(&config(), vec![])
            .with_stream(true)
            .with_tools(vec![tool.clone()]);
        let value = to_value(&request).unwrap();
        assert_eq!(value["stream"], json!(true));
        assert_eq!(value["tools"], json!([tool]));
        assert_eq!(value["tool_choice"], json!("auto"));
    }

    #[test]
    fn empty_tools_are_omitted() {
        let request =
            ChatCompletionRequest::from_config(&config(), vec![]).with_tools(Vec::new());
        let value = to_value(&request).unwrap();
        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());
    }
}
