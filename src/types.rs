//! Canonical message model shared by the agent and every backend adapter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Input of a tool call: a string-keyed map of arbitrary JSON values.
pub type ToolInput = Map<String, Value>;

/// Message role in the conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    /// Wire name of the role (`"system"`, `"user"`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured request, emitted by a backend, to invoke a registered tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: ToolInput,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: ToolInput) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    /// Build a call from a decoded JSON value, which must be an object (or null).
    pub fn from_value(
        id: impl Into<String>,
        name: impl Into<String>,
        input: Value,
    ) -> crate::Result<Self> {
        let input = match input {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(crate::Error::invalid_response(format!(
                    "tool input must be a JSON object, got {other}"
                )));
            }
        };
        Ok(Self::new(id, name, input))
    }
}

/// Outcome of executing one tool call. Converted straight into a tool message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: output.into(),
            is_error: true,
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Only meaningful on tool messages
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            is_error: false,
            timestamp: Utc::now(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, Some(text.into()))
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, Some(text.into()))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, Some(text.into()))
    }

    /// Assistant turn carrying optional text and the tool calls it requested.
    /// An empty call list is stored as `None`.
    pub fn assistant_with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::new(MessageRole::Assistant, content);
        if !tool_calls.is_empty() {
            msg.tool_calls = Some(tool_calls);
        }
        msg
    }

    pub fn tool_result(result: ToolResult) -> Self {
        let mut msg = Self::new(MessageRole::Tool, Some(result.output));
        msg.tool_call_id = Some(result.tool_call_id);
        msg.is_error = result.is_error;
        msg
    }

    /// Tool calls of this message, empty when there are none
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }
}

/// An ordered, append-only sequence of messages with a stable id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::with_messages(Vec::new())
    }

    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The system message, if the conversation has one
    pub fn system_message(&self) -> Option<&Message> {
        self.messages
            .first()
            .filter(|m| m.role == MessageRole::System)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-streaming backend reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendResponse {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl BackendResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    pub fn with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content,
            tool_calls: Some(tool_calls),
        }
    }

    /// Tool calls of this response, empty when there are none
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }
}

/// One item of a streaming backend reply
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Content(String),
    ToolCall(ToolCall),
    Done,
}
