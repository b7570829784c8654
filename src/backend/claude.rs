//! Anthropic Messages API adapter
//!
//! Wire shape (`POST {base}/v1/messages`):
//!
//! - the system message moves to the top-level `system` field
//! - every other message becomes `{role, content: [blocks]}` in its original position
//! - assistant tool calls become `tool_use` blocks after the text block
//! - a tool message becomes a `user` turn holding one `tool_result` block
//!
//! Streaming replies are decoded by [`ClaudeStreamDecoder`], which accumulates
//! `input_json_delta` fragments per content block and only emits a
//! [`StreamChunk::ToolCall`] once the block is closed.

use super::{Backend, ChunkStream, FrameDecoder, decode_sse, endpoint, execute, http_client};
use crate::tools::Tool;
use crate::types::{
    BackendResponse, Conversation, Message, MessageRole, StreamChunk, ToolCall,
};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Model used when none is configured
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-opus-20240229";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const MESSAGES_PATH: &str = "/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Backend for Anthropic's Claude models
#[derive(Clone)]
pub struct ClaudeBackend {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    http: reqwest::Client,
}

impl ClaudeBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_CLAUDE_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Apply a whole-request timeout to every call
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = http_client(Some(timeout))?;
        Ok(self)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Encode a conversation into a Messages API request body
    pub fn request_body(
        &self,
        conversation: &Conversation,
        tools: &[Arc<dyn Tool>],
        stream: bool,
    ) -> Value {
        let mut system: Vec<&str> = Vec::new();
        let mut messages = Vec::with_capacity(conversation.len());

        for msg in &conversation.messages {
            match msg.role {
                MessageRole::System => {
                    if let Some(text) = msg.content.as_deref() {
                        system.push(text);
                    }
                }
                MessageRole::Tool => messages.push(encode_tool_result(msg)),
                MessageRole::User | MessageRole::Assistant => messages.push(encode_turn(msg)),
            }
        }

        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": messages,
            "stream": stream,
        });

        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }

        if !tools.is_empty() {
            let tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name(),
                        "description": t.description(),
                        "input_schema": t.input_schema().to_value(),
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }

        body
    }

    fn request(&self, body: &Value) -> reqwest::RequestBuilder {
        let url = endpoint(&self.base_url, MESSAGES_PATH);
        log::debug!("Claude request to {} (model {})", url, self.model);
        self.http
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(body)
    }
}

impl std::fmt::Debug for ClaudeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeBackend")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

fn encode_turn(msg: &Message) -> Value {
    let mut blocks = Vec::new();
    if let Some(text) = msg.content.as_deref() {
        // The API rejects empty text blocks next to tool_use blocks
        if !text.is_empty() || msg.tool_calls().is_empty() {
            blocks.push(json!({"type": "text", "text": text}));
        }
    }
    for call in msg.tool_calls() {
        blocks.push(json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.name,
            "input": call.input,
        }));
    }
    json!({"role": msg.role.as_str(), "content": blocks})
}

fn encode_tool_result(msg: &Message) -> Value {
    json!({
        "role": "user",
        "content": [{
            "type": "tool_result",
            "tool_use_id": msg.tool_call_id.as_deref().unwrap_or_default(),
            "content": msg.content.as_deref().unwrap_or_default(),
            "is_error": msg.is_error,
        }],
    })
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

impl MessagesResponse {
    fn into_backend_response(self) -> Result<BackendResponse> {
        let mut text: Option<String> = None;
        let mut tool_calls = Vec::new();

        for block in self.content {
            match block {
                ContentBlock::Text { text: part } => text.get_or_insert_with(String::new).push_str(&part),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::from_value(id, name, input)?)
                }
                ContentBlock::Other => {}
            }
        }

        Ok(BackendResponse {
            content: text,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        })
    }
}

#[async_trait]
impl Backend for ClaudeBackend {
    async fn send(
        &self,
        conversation: &Conversation,
        tools: &[Arc<dyn Tool>],
    ) -> Result<BackendResponse> {
        let body = self.request_body(conversation, tools, false);
        let response = execute(self.request(&body)).await?;
        let payload: MessagesResponse = serde_json::from_str(&response.text().await?)?;
        payload.into_backend_response()
    }

    fn stream(&self, conversation: &Conversation, tools: &[Arc<dyn Tool>]) -> ChunkStream {
        let body = self.request_body(conversation, tools, true);
        decode_sse(execute(self.request(&body)), ClaudeStreamDecoder::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockStart {
        #[serde(default)]
        index: u32,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        #[serde(default)]
        index: u32,
        delta: Delta,
    },
    ContentBlockStop {
        #[serde(default)]
        index: u32,
    },
    MessageStop,
    Error {
        error: ErrorBody,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

/// A `tool_use` block that has been opened but not yet closed
#[derive(Debug)]
struct PendingToolUse {
    id: String,
    name: String,
    start_input: Value,
    partial_json: String,
}

impl PendingToolUse {
    fn finish(self) -> Result<ToolCall> {
        let input = if self.partial_json.trim().is_empty() {
            self.start_input
        } else {
            serde_json::from_str(&self.partial_json).map_err(|e| {
                Error::invalid_response(format!(
                    "Failed to parse input of tool call '{}': {}",
                    self.name, e
                ))
            })?
        };
        ToolCall::from_value(self.id, self.name, input)
    }
}

/// Stateful decoder for Claude's streaming events.
///
/// Text deltas are emitted as they arrive. Tool-use blocks are keyed by their content
/// block index, so interleaved blocks assemble independently.
#[derive(Debug, Default)]
pub struct ClaudeStreamDecoder {
    pending: BTreeMap<u32, PendingToolUse>,
}

impl ClaudeStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn flush(&mut self) -> Result<Vec<StreamChunk>> {
        std::mem::take(&mut self.pending)
            .into_values()
            .map(|pending| pending.finish().map(StreamChunk::ToolCall))
            .collect()
    }
}

impl FrameDecoder for ClaudeStreamDecoder {
    fn decode(&mut self, data: &str) -> Result<Vec<StreamChunk>> {
        let event: StreamEvent = serde_json::from_str(data)
            .map_err(|e| Error::invalid_response(format!("Failed to parse stream event: {e}")))?;

        match event {
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                ContentBlock::ToolUse { id, name, input } => {
                    self.pending.insert(
                        index,
                        PendingToolUse {
                            id,
                            name,
                            start_input: input,
                            partial_json: String::new(),
                        },
                    );
                    Ok(Vec::new())
                }
                ContentBlock::Text { text } if !text.is_empty() => {
                    Ok(vec![StreamChunk::Content(text)])
                }
                _ => Ok(Vec::new()),
            },
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                Delta::TextDelta { text } if !text.is_empty() => {
                    Ok(vec![StreamChunk::Content(text)])
                }
                Delta::InputJsonDelta { partial_json } => {
                    match self.pending.get_mut(&index) {
                        Some(pending) => pending.partial_json.push_str(&partial_json),
                        None => log::warn!("input_json_delta for unknown content block {index}"),
                    }
                    Ok(Vec::new())
                }
                _ => Ok(Vec::new()),
            },
            StreamEvent::ContentBlockStop { index } => match self.pending.remove(&index) {
                Some(pending) => Ok(vec![StreamChunk::ToolCall(pending.finish()?)]),
                None => Ok(Vec::new()),
            },
            StreamEvent::MessageStop => {
                let mut chunks = self.flush()?;
                chunks.push(StreamChunk::Done);
                Ok(chunks)
            }
            StreamEvent::Error { error } => {
                let detail = if error.message.is_empty() {
                    error.kind
                } else {
                    error.message
                };
                Err(Error::server(detail))
            }
            StreamEvent::Other => Ok(Vec::new()),
        }
    }

    fn finish(&mut self) -> Result<Vec<StreamChunk>> {
        self.flush()
    }
}
