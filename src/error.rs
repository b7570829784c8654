//! Error types for the relay agent

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate
///
/// Backend failures (`InvalidResponse` through `Network`) propagate unchanged out of
/// [`Agent::send_message`](crate::Agent::send_message) and
/// [`Agent::stream_message`](crate::Agent::stream_message). `Tool` and `InvalidInput`
/// are what tool implementations fail with; the agent absorbs them into tool-result
/// messages instead of surfacing them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed or unparseable backend payload
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Backend rejected the credentials (HTTP 401)
    #[error("Authentication failed")]
    Authentication,

    /// Backend throttled the request (HTTP 429)
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Backend reported a 5xx failure
    #[error("Server error: {0}")]
    Server(String),

    /// Transport failure or unexpected HTTP status
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Tool execution error
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// Invalid tool input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The tool loop ran more rounds than the configured cap
    #[error("Tool loop exceeded {0} rounds")]
    RoundLimitExceeded(u32),
}

impl Error {
    /// Create a new invalid response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Error::InvalidResponse(msg.into())
    }

    /// Create a new server error
    pub fn server(msg: impl Into<String>) -> Self {
        Error::Server(msg.into())
    }

    /// Create a new network error
    pub fn network(msg: impl Into<String>) -> Self {
        Error::Network(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::InvalidConfiguration(msg.into())
    }

    /// Create a new tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidResponse(err.to_string())
    }
}
