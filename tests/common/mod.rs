//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use relay_agent::{
    Backend, BackendResponse, ChunkStream, Conversation, Result, StreamChunk, Tool, ToolCall,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// What the backend saw on one call
#[derive(Debug, Clone)]
pub struct Observed {
    pub conversation: Conversation,
    pub tool_names: Vec<String>,
}

/// In-memory backend replaying scripted replies in order
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<BackendResponse>>>,
    streams: Mutex<VecDeque<Vec<Result<StreamChunk>>>>,
    observed: Mutex<Vec<Observed>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(self: &Arc<Self>, reply: Result<BackendResponse>) -> Arc<Self> {
        self.replies.lock().unwrap().push_back(reply);
        self.clone()
    }

    pub fn stream_reply(self: &Arc<Self>, chunks: Vec<Result<StreamChunk>>) -> Arc<Self> {
        self.streams.lock().unwrap().push_back(chunks);
        self.clone()
    }

    pub fn observed(&self) -> Vec<Observed> {
        self.observed.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.observed.lock().unwrap().len()
    }

    fn observe(&self, conversation: &Conversation, tools: &[Arc<dyn Tool>]) {
        self.observed.lock().unwrap().push(Observed {
            conversation: conversation.clone(),
            tool_names: tools.iter().map(|t| t.name().to_string()).collect(),
        });
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn send(
        &self,
        conversation: &Conversation,
        tools: &[Arc<dyn Tool>],
    ) -> Result<BackendResponse> {
        self.observe(conversation, tools);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted reply left")
    }

    fn stream(&self, conversation: &Conversation, tools: &[Arc<dyn Tool>]) -> ChunkStream {
        self.observe(conversation, tools);
        let chunks = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted stream left");
        Box::pin(futures::stream::iter(chunks))
    }
}

/// Sets its flag when dropped
pub struct DropFlag(pub Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Streams one fragment, then never finishes. Records when its stream is dropped.
#[derive(Default)]
pub struct HangingBackend {
    pub dropped: Arc<AtomicBool>,
}

#[async_trait]
impl Backend for HangingBackend {
    async fn send(&self, _: &Conversation, _: &[Arc<dyn Tool>]) -> Result<BackendResponse> {
        futures::future::pending().await
    }

    fn stream(&self, _: &Conversation, _: &[Arc<dyn Tool>]) -> ChunkStream {
        let guard = DropFlag(self.dropped.clone());
        Box::pin(async_stream::stream! {
            let _guard = guard;
            yield Ok(StreamChunk::Content("Hello".to_string()));
            futures::future::pending::<()>().await;
        })
    }
}

pub fn call(id: &str, name: &str, input: Value) -> ToolCall {
    ToolCall::from_value(id, name, input).expect("object input")
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
