//! # relay-agent
//!
//! A tool-calling conversational agent over pluggable LLM backends.
//!
//! ## Overview
//!
//! An [`Agent`] keeps one conversation and talks to one [`Backend`]:
//! - [`ClaudeBackend`]: Anthropic Messages API, with tool use
//! - [`OpenAiBackend`]: OpenAI Chat Completions, text only
//! - [`CustomServerBackend`]: a self-hosted `/chat` server, text only
//!
//! When the model asks for a registered [`Tool`], the agent runs it, appends the result to
//! the conversation and asks the model again, until the model answers in plain text.
//!
//! ## Key Features
//!
//! - **Streaming**: text fragments are yielded as they arrive, across tool rounds
//! - **Tool calling**: struct tools or closure tools built with [`tool()`]
//! - **Human in the loop**: an `ask_user` tool routed to a handler you register
//! - **Drop to cancel**: dropping a message stream closes the HTTP response
//! - **Retry helpers**: exponential backoff with jitter for callers that want it
//!
//! ## Example
//!
//! ```rust,no_run
//! use relay_agent::{Agent, CalculatorTool, ClaudeBackend, tool};
//!
//! #[tokio::main]
//! async fn main() -> relay_agent::Result<()> {
//!     let backend = ClaudeBackend::new(std::env::var("ANTHROPIC_API_KEY").unwrap_or_default())
//!         .with_model("claude-3-5-sonnet-20241022");
//!
//!     let weather = tool("get_weather", "Current weather for a city")
//!         .described_param("city", "string", "City name")
//!         .build(|input| async move {
//!             let city = relay_agent::required_str(&input, "city")?;
//!             Ok(format!("Sunny in {city}"))
//!         });
//!
//!     let mut agent = Agent::builder()
//!         .backend(backend)
//!         .system_prompt("You are a helpful assistant")
//!         .tool(CalculatorTool)
//!         .tool(weather)
//!         .user_input_handler(|question| async move {
//!             println!("{question}");
//!             String::from("yes")
//!         })
//!         .with_user_input_tool()
//!         .build()?;
//!
//!     let answer = agent.send_message("What's 6 * 7, and is it sunny in Oslo?").await?;
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **agent**: the conversation owner and the tool-calling loop
//! - **backend**: the [`Backend`] trait, SSE framing and the three adapters
//! - **types**: messages, conversations, tool calls and stream chunks
//! - **tools**: the [`Tool`] trait, input schemas and closure tools
//! - **builtin_tools**: calculator, file reader, mock web search, `ask_user`
//! - **user_input**: the handler slot shared with `ask_user`
//! - **config**: environment-driven backend construction
//! - **error**: the [`Error`] enum and [`Result`] alias
//! - **retry**: backoff helpers

mod agent;
mod config;
mod error;
mod tools;
mod types;
mod user_input;

/// Backend trait, SSE framing, and the Claude, OpenAI and custom-server adapters
pub mod backend;

/// Ready-made tools
pub mod builtin_tools;

/// Exponential backoff for callers that choose to retry
pub mod retry;

// --- Agent ---

pub use agent::{Agent, AgentBuilder, MessageStream};

// --- Backends ---

pub use backend::{
    Backend, ChunkStream, ClaudeBackend, CustomServerBackend, DEFAULT_CLAUDE_MODEL,
    DEFAULT_OPENAI_MODEL, OpenAiBackend,
};

// --- Configuration ---

pub use config::{BackendKind, backend_from_env, get_api_key, get_base_url, get_model};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Tool System ---

pub use builtin_tools::{CalculatorTool, FileReaderTool, UserInputTool, WebSearchTool};
pub use tools::{
    FnTool, PropertySchema, Tool, ToolBuilder, ToolHandler, ToolInputSchema, Toolset,
    optional_i64, required_str, tool,
};

// --- Core Types ---

pub use types::{
    BackendResponse, Conversation, Message, MessageRole, StreamChunk, ToolCall, ToolInput,
    ToolResult,
};

// --- User Input ---

pub use user_input::{UserInputBridge, UserInputHandler, WeakUserInputBridge};

/// The most commonly used types, for `use relay_agent::prelude::*;`
pub mod prelude {
    pub use crate::{
        Agent, AgentBuilder, Backend, ClaudeBackend, CustomServerBackend, Error, Message,
        MessageRole, OpenAiBackend, Result, StreamChunk, Tool, ToolCall, ToolInput,
        ToolInputSchema, tool,
    };
}
