//! OpenAI Chat Completions adapter.
//!
//! Messages map role and content one to one. Registered tools are not sent and tool calls
//! are never decoded, so a conversation driven through this backend is text only.

use super::{Backend, ChunkStream, FrameDecoder, decode_sse, endpoint, execute, http_client};
use crate::tools::Tool;
use crate::types::{BackendResponse, Conversation, StreamChunk};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Model used when none is configured
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Backend for OpenAI-compatible chat completion endpoints
#[derive(Clone)]
pub struct OpenAiBackend {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: Option<u32>,
    http: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: None,
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

    /// Cap the completion length. Unset by default, leaving it to the server.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

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

    fn build_request<'a>(&'a self, conversation: &'a Conversation, stream: bool) -> OpenAIRequest<'a> {
        OpenAIRequest {
            model: &self.model,
            messages: conversation
                .messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: m.role.as_str(),
                    content: m.content.as_deref().unwrap_or_default(),
                })
                .collect(),
            stream,
            max_tokens: self.max_tokens,
        }
    }

    fn request(&self, conversation: &Conversation, stream: bool) -> reqwest::RequestBuilder {
        let url = endpoint(&self.base_url, COMPLETIONS_PATH);
        log::debug!("OpenAI request to {} (model {})", url, self.model);
        self.http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&self.build_request(conversation, stream))
    }
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChunk {
    #[serde(default)]
    choices: Vec<OpenAIChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChunkChoice {
    #[serde(default)]
    delta: OpenAIDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn send(
        &self,
        conversation: &Conversation,
        _tools: &[Arc<dyn Tool>],
    ) -> Result<BackendResponse> {
        let response = execute(self.request(conversation, false)).await?;
        let payload: OpenAIResponse = serde_json::from_str(&response.text().await?)?;
        let choice = payload
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::invalid_response("Response contained no choices"))?;

        Ok(BackendResponse {
            content: choice.message.content,
            tool_calls: None,
        })
    }

    fn stream(&self, conversation: &Conversation, _tools: &[Arc<dyn Tool>]) -> ChunkStream {
        decode_sse(
            execute(self.request(conversation, true)),
            OpenAiStreamDecoder::new(),
        )
    }
}

/// Decoder for `chat.completion.chunk` frames; only text deltas are kept
#[derive(Debug, Default)]
pub struct OpenAiStreamDecoder;

impl OpenAiStreamDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl FrameDecoder for OpenAiStreamDecoder {
    fn decode(&mut self, data: &str) -> Result<Vec<StreamChunk>> {
        let chunk: OpenAIChunk = serde_json::from_str(data)
            .map_err(|e| Error::invalid_response(format!("Failed to parse chunk: {e}")))?;

        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|text| !text.is_empty())
            .map(StreamChunk::Content)
            .into_iter()
            .collect())
    }
}
