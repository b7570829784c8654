//! Adapter for a self-hosted chat server.
//!
//! ```text
//! POST {base}/chat          {"conversationId": "...", "messages": [{"role": "user", "content": "Hi"}]}
//!                           -> {"content": "Hello"}
//! POST {base}/chat/stream   same body, Accept: text/event-stream
//!                           -> data: {"content": "Hel"} ...
//! ```
//!
//! Messages without content are left out of the body. Tool calls are neither sent nor
//! decoded.

use super::{Backend, ChunkStream, FrameDecoder, decode_sse, endpoint, execute, http_client};
use crate::tools::Tool;
use crate::types::{BackendResponse, Conversation, StreamChunk};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const CHAT_PATH: &str = "/chat";
const CHAT_STREAM_PATH: &str = "/chat/stream";

/// Backend for a custom HTTP chat server
#[derive(Clone)]
pub struct CustomServerBackend {
    base_url: String,
    headers: HeaderMap,
    http: reqwest::Client,
}

impl CustomServerBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            headers: HeaderMap::new(),
            http: reqwest::Client::new(),
        }
    }

    /// Add a header sent with every request, replacing any earlier value for `name`
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::config(format!("Invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::config(format!("Invalid value for header '{name}': {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Add several headers at once
    pub fn with_headers<I, K, V>(self, headers: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        headers
            .into_iter()
            .try_fold(self, |backend, (k, v)| backend.with_header(k.as_ref(), v.as_ref()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = http_client(Some(timeout))?;
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn build_request<'a>(&self, conversation: &'a Conversation) -> ChatRequest<'a> {
        ChatRequest {
            conversation_id: &conversation.id,
            messages: conversation
                .messages
                .iter()
                .filter_map(|m| {
                    m.content.as_deref().map(|content| ChatMessage {
                        role: m.role.as_str(),
                        content,
                    })
                })
                .collect(),
        }
    }

    fn request(&self, path: &str, conversation: &Conversation) -> reqwest::RequestBuilder {
        let url = endpoint(&self.base_url, path);
        log::debug!("Custom server request to {}", url);
        self.http
            .post(url)
            .headers(self.headers.clone())
            .json(&self.build_request(conversation))
    }
}

impl std::fmt::Debug for CustomServerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomServerBackend")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    conversation_id: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    content: String,
}

#[async_trait]
impl Backend for CustomServerBackend {
    async fn send(
        &self,
        conversation: &Conversation,
        _tools: &[Arc<dyn Tool>],
    ) -> Result<BackendResponse> {
        let response = execute(self.request(CHAT_PATH, conversation)).await?;
        let payload: ChatResponse = serde_json::from_str(&response.text().await?)?;
        Ok(BackendResponse::text(payload.content))
    }

    fn stream(&self, conversation: &Conversation, _tools: &[Arc<dyn Tool>]) -> ChunkStream {
        let request = self
            .request(CHAT_STREAM_PATH, conversation)
            .header(ACCEPT, "text/event-stream");
        decode_sse(execute(request), ContentFrameDecoder)
    }
}

/// Frames are `{"content": "..."}`
#[derive(Debug, Default)]
struct ContentFrameDecoder;

impl FrameDecoder for ContentFrameDecoder {
    fn decode(&mut self, data: &str) -> Result<Vec<StreamChunk>> {
        let frame: ChatResponse = serde_json::from_str(data)
            .map_err(|e| Error::invalid_response(format!("Failed to parse frame: {e}")))?;
        if frame.content.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![StreamChunk::Content(frame.content)])
    }
}
