//! Server-Sent Events framing.
//!
//! Responses arrive as
//!
//! ```text
//! event: content_block_delta
//! data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"Hi"}}
//!
//! data: [DONE]
//! ```
//!
//! [`data_frames`] yields the `data` payload of each event. Byte chunks from the transport
//! may split events (or UTF-8 sequences) anywhere; `eventsource-stream` reassembles them.
//! Events with an empty payload are skipped, and a `[DONE]` payload ends the stream
//! without being yielded.

use crate::{Error, Result};
use eventsource_stream::{EventStreamError, Eventsource};
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;

/// End-of-stream sentinel used by OpenAI-compatible servers
pub const DONE_SENTINEL: &str = "[DONE]";

/// Stream of raw SSE `data` payloads
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Split an HTTP response body into SSE data payloads
pub fn data_frames(response: reqwest::Response) -> FrameStream {
    frames_from_bytes(response.bytes_stream())
}

/// Same as [`data_frames`] for any byte stream
pub fn frames_from_bytes<S, B, E>(bytes: S) -> FrameStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]>,
    E: Into<Error> + std::fmt::Display,
{
    let frames = bytes
        .eventsource()
        .map(|event| match event {
            Ok(event) => Ok(event.data),
            Err(EventStreamError::Transport(e)) => Err(e.into()),
            Err(e) => Err(Error::invalid_response(format!("Malformed event stream: {e}"))),
        })
        .filter(|frame| {
            let keep = !matches!(frame, Ok(data) if data.is_empty());
            futures::future::ready(keep)
        })
        .take_while(|frame| {
            let more = !matches!(frame, Ok(data) if data.trim() == DONE_SENTINEL);
            futures::future::ready(more)
        });

    Box::pin(frames)
}
