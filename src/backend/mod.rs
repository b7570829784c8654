//! Backend adapters
//!
//! A [`Backend`] turns the canonical [`Conversation`] into one concrete wire protocol and
//! decodes the reply back into [`BackendResponse`] or a stream of [`StreamChunk`]s. The
//! agent never sees HTTP; it only talks to this trait.
//!
//! # Streaming contract
//!
//! [`Backend::stream`] returns a [`ChunkStream`] without touching the network. The request
//! goes out when the stream is first polled, and dropping the stream drops the response
//! body. A stream fails by yielding one `Err` and then ending. A stream that ends normally
//! yields [`StreamChunk::Done`] last.
//!
//! # Status mapping
//!
//! Every adapter maps HTTP statuses the same way, for both `send` and `stream`:
//!
//! | Status    | Result                                    |
//! |-----------|-------------------------------------------|
//! | 200       | body is parsed                            |
//! | 401       | [`Error::Authentication`]                 |
//! | 429       | [`Error::RateLimitExceeded`]              |
//! | 500..=599 | `Error::Server("<code>")`                 |
//! | other     | `Error::Network("Bad server response: <code>")` |

mod claude;
mod custom_server;
mod openai;
pub mod sse;

pub use claude::{ClaudeBackend, ClaudeStreamDecoder, DEFAULT_CLAUDE_MODEL};
pub use custom_server::CustomServerBackend;
pub use openai::{DEFAULT_OPENAI_MODEL, OpenAiBackend, OpenAiStreamDecoder};

use crate::tools::Tool;
use crate::types::{BackendResponse, Conversation, StreamChunk};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Lazy, finite stream of chunks from one backend round
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// A conversational model reachable over some protocol
#[async_trait]
pub trait Backend: Send + Sync {
    /// One request, one complete reply
    async fn send(
        &self,
        conversation: &Conversation,
        tools: &[Arc<dyn Tool>],
    ) -> Result<BackendResponse>;

    /// One request, replied to incrementally.
    ///
    /// Everything the request needs is captured up front, so the returned stream does
    /// not borrow `conversation` or `tools`.
    fn stream(&self, conversation: &Conversation, tools: &[Arc<dyn Tool>]) -> ChunkStream;
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Box<B> {
    async fn send(
        &self,
        conversation: &Conversation,
        tools: &[Arc<dyn Tool>],
    ) -> Result<BackendResponse> {
        (**self).send(conversation, tools).await
    }

    fn stream(&self, conversation: &Conversation, tools: &[Arc<dyn Tool>]) -> ChunkStream {
        (**self).stream(conversation, tools)
    }
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Arc<B> {
    async fn send(
        &self,
        conversation: &Conversation,
        tools: &[Arc<dyn Tool>],
    ) -> Result<BackendResponse> {
        (**self).send(conversation, tools).await
    }

    fn stream(&self, conversation: &Conversation, tools: &[Arc<dyn Tool>]) -> ChunkStream {
        (**self).stream(conversation, tools)
    }
}

/// Map a non-200 HTTP status to the error taxonomy
pub fn status_to_error(status: u16) -> Error {
    match status {
        401 => Error::Authentication,
        429 => Error::RateLimitExceeded,
        500..=599 => Error::server(status.to_string()),
        _ => Error::network(format!("Bad server response: {status}")),
    }
}

/// Pass a 200 response through, turn anything else into an error
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status().as_u16();
    if status == 200 {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<failed to read body: {e}>"));
    log::warn!("Backend returned HTTP {}: {}", status, excerpt(&body));
    Err(status_to_error(status))
}

/// Send a prepared request and apply the status mapping
pub(crate) async fn execute(request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
    check_status(request.send().await?).await
}

fn excerpt(body: &str) -> &str {
    const MAX: usize = 512;
    if body.len() <= MAX {
        return body;
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

pub(crate) fn http_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Incremental decoder for the data frames of one SSE response
pub trait FrameDecoder: Send + 'static {
    /// Decode one frame. Returning [`StreamChunk::Done`] ends the stream after that chunk.
    fn decode(&mut self, data: &str) -> Result<Vec<StreamChunk>>;

    /// Called once when the frames run out without an explicit end marker
    fn finish(&mut self) -> Result<Vec<StreamChunk>> {
        Ok(Vec::new())
    }
}

/// Drive `request` lazily and run its SSE frames through `decoder`.
///
/// Nothing happens until the returned stream is polled. The first error ends the stream.
pub(crate) fn decode_sse<F, D>(request: F, mut decoder: D) -> ChunkStream
where
    F: Future<Output = Result<reqwest::Response>> + Send + 'static,
    D: FrameDecoder,
{
    Box::pin(async_stream::stream! {
        let response = match request.await {
            Ok(response) => response,
            Err(e) => {
                yield Err(e);
                return;
            }
        };

        let mut frames = sse::data_frames(response);
        while let Some(frame) = frames.next().await {
            let data = match frame {
                Ok(data) => data,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            match decoder.decode(&data) {
                Ok(chunks) => {
                    for chunk in chunks {
                        let done = chunk == StreamChunk::Done;
                        yield Ok(chunk);
                        if done {
                            return;
                        }
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        match decoder.finish() {
            Ok(chunks) => {
                for chunk in chunks {
                    yield Ok(chunk);
                }
            }
            Err(e) => {
                yield Err(e);
                return;
            }
        }
        yield Ok(StreamChunk::Done);
    })
}
