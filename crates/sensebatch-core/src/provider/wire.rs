//! Wire formats: the NDJSON batch payloads and the chat-completions shapes
//! they embed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::prompt::SensePrompt;
use crate::types::{TokenUsage, UnitId};

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
}

impl ChatRequest {
    /// A request forcing the answer through the sense tool.
    pub fn forced_tool(model: &str, prompt: &SensePrompt) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage::user(prompt.text.clone())],
            tools: vec![prompt.tool()],
            tool_choice: Some(SensePrompt::tool_choice()),
        }
    }
}

/// One line of the submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequestLine {
    pub custom_id: String,
    pub method: String,
    pub url: String,
    pub body: ChatRequest,
}

impl BatchRequestLine {
    pub fn new(unit_id: UnitId, body: ChatRequest) -> Self {
        Self {
            custom_id: unit_id.to_string(),
            method: "POST".into(),
            url: CHAT_COMPLETIONS_PATH.into(),
            body,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
}

impl From<Usage> for TokenUsage {
    fn from(usage: Usage) -> Self {
        TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: Option<String>,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletion {
    /// Arguments of the first tool call named `tool`, if any.
    pub fn tool_arguments(&self, tool: &str) -> Option<&str> {
        self.choices
            .first()?
            .message
            .tool_calls
            .as_deref()?
            .iter()
            .find(|call| call.function.name == tool)
            .map(|call| call.function.arguments.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultResponse {
    pub status_code: u16,
    #[serde(default)]
    pub body: Option<ChatCompletion>,
}

/// One line of the retrieval payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResultLine {
    pub custom_id: String,
    #[serde(default)]
    pub response: Option<ResultResponse>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl BatchResultLine {
    pub fn unit_id(&self) -> Option<UnitId> {
        self.custom_id.parse().ok()
    }
}
