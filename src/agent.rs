//! The agent: conversation owner and tool-calling loop
//!
//! An [`Agent`] owns one [`Conversation`], one [`Backend`], a set of registered tools and a
//! [`UserInputBridge`]. Every mutating call takes `&mut self`, so one agent runs one
//! exchange at a time. Share an agent between tasks by wrapping it in a
//! `tokio::sync::Mutex`.
//!
//! # The loop
//!
//! ```text
//! send_message("...")
//!     │
//!     ├─> user message appended
//!     │
//!     ├─> backend round ─────────────────────────────┐
//!     │                                               │
//!     ├─> tool calls?  yes ─> execute each in order, │
//!     │                       then append the assistant message
//!     │                       and one tool message per call ─┘
//!     │
//!     └─> no: append the assistant message, return its text
//! ```
//!
//! A round is appended only once all its tools have finished. Cancelling an exchange
//! while a tool is running (for instance during an `ask_user` wait) leaves the
//! conversation at the end of the previous round, never with a tool call that has no
//! result.
//!
//! A missing tool or a failing tool does not stop the loop; the failure is recorded as a
//! tool message with `is_error` set and the model gets to react to it. A backend failure
//! does stop the loop and is returned unchanged, with nothing appended for the failed
//! round.
//!
//! # Streaming
//!
//! [`Agent::stream_message`] runs the same loop but yields text fragments as they arrive.
//! The returned stream borrows the agent; nothing runs in the background, so dropping the
//! stream stops the exchange and closes the backend's HTTP response.
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use relay_agent::{Agent, CalculatorTool};
//!
//! # async fn example() -> relay_agent::Result<()> {
//! let mut agent = Agent::with_claude(std::env::var("ANTHROPIC_API_KEY").unwrap_or_default());
//! agent.register_tool(CalculatorTool);
//!
//! let mut stream = agent.stream_message("What is 12 * (3 + 4)?");
//! while let Some(fragment) = stream.next().await {
//!     print!("{}", fragment?);
//! }
//! # Ok(())
//! # }
//! ```

use crate::backend::{Backend, ClaudeBackend, CustomServerBackend, OpenAiBackend};
use crate::builtin_tools::UserInputTool;
use crate::tools::{Tool, Toolset};
use crate::types::{Conversation, Message, StreamChunk, ToolCall, ToolResult};
use crate::user_input::UserInputBridge;
use crate::{Error, Result};
use futures::stream::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Text fragments of a streamed exchange
pub type MessageStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

/// Conversational agent over a pluggable backend
pub struct Agent {
    backend: Box<dyn Backend>,
    conversation: Conversation,
    system_prompt: Option<String>,
    tools: Toolset,
    user_input: UserInputBridge,
    max_tool_rounds: Option<u32>,
}

impl Agent {
    /// Agent with an empty conversation
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self::from_parts(Box::new(backend), None)
    }

    /// Agent whose conversation starts with a system message
    pub fn with_system_prompt(backend: impl Backend + 'static, prompt: impl Into<String>) -> Self {
        Self::from_parts(Box::new(backend), Some(prompt.into()))
    }

    /// Claude backend with default model and endpoint
    pub fn with_claude(api_key: impl Into<String>) -> Self {
        Self::new(ClaudeBackend::new(api_key))
    }

    /// OpenAI backend with default model and endpoint
    pub fn with_openai(api_key: impl Into<String>) -> Self {
        Self::new(OpenAiBackend::new(api_key))
    }

    /// Custom chat server at `base_url`
    pub fn with_custom_server(base_url: impl Into<String>) -> Self {
        Self::new(CustomServerBackend::new(base_url))
    }

    /// Start an [`AgentBuilder`]
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    fn from_parts(backend: Box<dyn Backend>, system_prompt: Option<String>) -> Self {
        Self {
            backend,
            conversation: initial_conversation(system_prompt.as_deref()),
            system_prompt,
            tools: Toolset::new(),
            user_input: UserInputBridge::new(),
            max_tool_rounds: None,
        }
    }

    /// Register a tool. A tool with the same name is replaced in place.
    pub fn register_tool(&mut self, tool: impl Tool + 'static) {
        self.tools.register(Arc::new(tool));
    }

    /// Register an already shared tool
    pub fn register_shared_tool(&mut self, tool: Arc<dyn Tool>) {
        self.tools.register(tool);
    }

    /// Register several tools in order
    pub fn register_tools(&mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) {
        for tool in tools {
            self.tools.register(tool);
        }
    }

    /// Look up a registered tool by exact name
    pub fn tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Registered tools in registration order
    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        self.tools.as_slice()
    }

    /// An `ask_user` tool wired to this agent's user-input handler.
    ///
    /// The tool holds a weak handle, so registering it on this agent creates no cycle.
    pub fn user_input_tool(&self) -> UserInputTool {
        UserInputTool::new(self.user_input.downgrade())
    }

    /// Handler answering `ask_user` questions. Replaces any previous handler.
    pub fn set_user_input_handler<F, Fut>(&mut self, handler: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        self.user_input.set_handler(handler);
    }

    /// Remove the handler; `ask_user` then reports that none is configured
    pub fn clear_user_input_handler(&mut self) {
        self.user_input.clear_handler();
    }

    /// Ask the operator directly. `None` when no handler is registered.
    pub async fn ask_user(&self, prompt: &str) -> Option<String> {
        self.user_input.ask(prompt).await
    }

    /// Cap on tool rounds per exchange. `None` (the default) means unbounded.
    pub fn set_max_tool_rounds(&mut self, max: Option<u32>) {
        self.max_tool_rounds = max;
    }

    /// Current tool-round cap
    pub fn max_tool_rounds(&self) -> Option<u32> {
        self.max_tool_rounds
    }

    /// Conversation messages, oldest first
    pub fn messages(&self) -> &[Message] {
        &self.conversation.messages
    }

    /// The whole conversation, including its id
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Id of the current conversation. Changes on [`clear_conversation`](Self::clear_conversation).
    pub fn conversation_id(&self) -> &str {
        &self.conversation.id
    }

    /// Start over with only the system message, if any
    pub fn clear_conversation(&mut self) {
        self.conversation = initial_conversation(self.system_prompt.as_deref());
    }

    /// Send a user message and run the tool loop to completion.
    ///
    /// Returns the text of the last assistant reply that had any, or an empty string.
    pub async fn send_message(&mut self, text: impl Into<String>) -> Result<String> {
        self.conversation.push(Message::user(text));

        let mut final_text: Option<String> = None;
        let mut tool_rounds = 0u32;

        loop {
            let response = self
                .backend
                .send(&self.conversation, self.tools.as_slice())
                .await?;
            let tool_calls = response.tool_calls.unwrap_or_default();

            if !tool_calls.is_empty() {
                self.check_round_limit(tool_rounds)?;
            }
            if let Some(content) = &response.content {
                final_text = Some(content.clone());
            }
            if tool_calls.is_empty() {
                if let Some(content) = response.content {
                    self.conversation.push(Message::assistant(content));
                }
                return Ok(final_text.unwrap_or_default());
            }

            let results = self.run_tool_calls(&tool_calls).await;
            self.commit_round(response.content, tool_calls, results);
            tool_rounds += 1;
        }
    }

    /// Send a user message and stream the reply as text fragments.
    ///
    /// Text is forwarded as soon as the backend produces it. Tool calls are collected
    /// until the round's stream ends, then executed as in
    /// [`send_message`](Self::send_message), and the next round starts streaming. The
    /// first error ends the stream.
    pub fn stream_message(&mut self, text: impl Into<String>) -> MessageStream<'_> {
        let text = text.into();

        Box::pin(async_stream::try_stream! {
            self.conversation.push(Message::user(text));
            let mut tool_rounds = 0u32;

            loop {
                let mut chunks = self
                    .backend
                    .stream(&self.conversation, self.tools.as_slice());
                let mut round_text = String::new();
                let mut tool_calls: Vec<ToolCall> = Vec::new();

                while let Some(chunk) = chunks.next().await {
                    match chunk? {
                        StreamChunk::Content(fragment) => {
                            round_text.push_str(&fragment);
                            yield fragment;
                        }
                        StreamChunk::ToolCall(call) => tool_calls.push(call),
                        StreamChunk::Done => break,
                    }
                }
                drop(chunks);

                if !tool_calls.is_empty() {
                    self.check_round_limit(tool_rounds)?;
                }
                let content = (!round_text.is_empty()).then_some(round_text);
                if tool_calls.is_empty() {
                    if let Some(content) = content {
                        self.conversation.push(Message::assistant(content));
                    }
                    break;
                }

                let results = self.run_tool_calls(&tool_calls).await;
                self.commit_round(content, tool_calls, results);
                tool_rounds += 1;
            }
        })
    }

    fn check_round_limit(&self, completed_rounds: u32) -> Result<()> {
        match self.max_tool_rounds {
            Some(max) if completed_rounds >= max => {
                log::warn!("Tool loop stopped after {} rounds", max);
                Err(Error::RoundLimitExceeded(max))
            }
            _ => Ok(()),
        }
    }

    /// Run a round's calls in order. Nothing is appended here, so a round cancelled
    /// mid-tool leaves the conversation as it was before the round.
    async fn run_tool_calls(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        log::debug!("Executing {} tool call(s)", calls.len());
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute_tool_call(call).await);
        }
        results
    }

    /// Append the assistant turn and one tool message per call
    fn commit_round(
        &mut self,
        content: Option<String>,
        calls: Vec<ToolCall>,
        results: Vec<ToolResult>,
    ) {
        self.conversation
            .push(Message::assistant_with_tool_calls(content, calls));
        for result in results {
            self.conversation.push(Message::tool_result(result));
        }
    }

    /// Run one tool call. Never fails: problems become an error result.
    async fn execute_tool_call(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            log::warn!("Tool '{}' not found", call.name);
            return ToolResult::error(&call.id, format!("Tool '{}' not found", call.name));
        };

        match tool.execute(&call.input).await {
            Ok(output) => ToolResult::success(&call.id, output),
            Err(e) => {
                log::warn!("Tool '{}' failed: {}", call.name, e);
                ToolResult::error(&call.id, e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("conversation_id", &self.conversation.id)
            .field("messages", &self.conversation.len())
            .field("tools", &self.tools)
            .field("user_input", &self.user_input)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish_non_exhaustive()
    }
}

fn initial_conversation(system_prompt: Option<&str>) -> Conversation {
    match system_prompt {
        Some(prompt) => Conversation::with_messages(vec![Message::system(prompt)]),
        None => Conversation::new(),
    }
}

/// Builder for [`Agent`]
#[derive(Default)]
pub struct AgentBuilder {
    backend: Option<Box<dyn Backend>>,
    system_prompt: Option<String>,
    tools: Vec<Arc<dyn Tool>>,
    max_tool_rounds: Option<u32>,
    user_input: UserInputBridge,
    user_input_tool: bool,
}

impl AgentBuilder {
    /// Backend to talk to. Required.
    pub fn backend(mut self, backend: impl Backend + 'static) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    /// Same as [`backend`](Self::backend) for an already boxed backend
    pub fn boxed_backend(mut self, backend: Box<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// System message the conversation starts with
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Register one tool
    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    /// Register several shared tools
    pub fn tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Cap tool rounds per exchange
    pub fn max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = Some(rounds);
        self
    }

    /// Handler answering `ask_user` questions
    pub fn user_input_handler<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        self.user_input.set_handler(handler);
        self
    }

    /// Also register an `ask_user` tool bound to the agent's handler
    pub fn with_user_input_tool(mut self) -> Self {
        self.user_input_tool = true;
        self
    }

    /// Fails with `InvalidConfiguration` when no backend was set
    pub fn build(self) -> Result<Agent> {
        let backend = self
            .backend
            .ok_or_else(|| Error::config("backend is required"))?;

        let mut agent = Agent::from_parts(backend, self.system_prompt);
        agent.user_input = self.user_input;
        agent.max_tool_rounds = self.max_tool_rounds;
        agent.register_tools(self.tools);
        if self.user_input_tool {
            let tool = agent.user_input_tool();
            agent.register_tool(tool);
        }
        Ok(agent)
    }
}

impl std::fmt::Debug for AgentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentBuilder")
            .field("has_backend", &self.backend.is_some())
            .field("system_prompt", &self.system_prompt)
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("max_tool_rounds", &self.max_tool_rounds)
            .finish_non_exhaustive()
    }
}
