//! Environment-driven backend configuration
//!
//! | Variable               | Used for                                  |
//! |------------------------|-------------------------------------------|
//! | `ANTHROPIC_API_KEY`    | Claude API key                            |
//! | `OPENAI_API_KEY`       | OpenAI API key                            |
//! | `RELAY_AGENT_BASE_URL` | Overrides the backend's base URL          |
//! | `RELAY_AGENT_MODEL`    | Overrides the model (Claude and OpenAI)   |
//!
//! ```rust,no_run
//! use relay_agent::{backend_from_env, Agent, BackendKind};
//!
//! # fn main() -> relay_agent::Result<()> {
//! let kind = BackendKind::parse("claude").unwrap_or(BackendKind::Claude);
//! let agent = Agent::new(backend_from_env(kind)?);
//! # let _ = agent;
//! # Ok(())
//! # }
//! ```

use crate::backend::{Backend, ClaudeBackend, CustomServerBackend, OpenAiBackend};
use crate::{Error, Result};
use std::env;

pub const BASE_URL_ENV: &str = "RELAY_AGENT_BASE_URL";
pub const MODEL_ENV: &str = "RELAY_AGENT_MODEL";

/// Supported backend families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Claude,
    OpenAi,
    CustomServer,
}

impl BackendKind {
    /// Default base URL for this backend
    pub fn default_url(&self) -> &'static str {
        match self {
            BackendKind::Claude => "https://api.anthropic.com",
            BackendKind::OpenAi => "https://api.openai.com",
            BackendKind::CustomServer => "http://localhost:8080",
        }
    }

    /// Environment variable holding the API key, if the backend needs one
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            BackendKind::Claude => Some("ANTHROPIC_API_KEY"),
            BackendKind::OpenAi => Some("OPENAI_API_KEY"),
            BackendKind::CustomServer => None,
        }
    }

    /// Parse a backend name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "claude" | "anthropic" => Some(BackendKind::Claude),
            "openai" | "open-ai" | "open_ai" | "gpt" => Some(BackendKind::OpenAi),
            "custom" | "custom-server" | "custom_server" | "server" => {
                Some(BackendKind::CustomServer)
            }
            _ => None,
        }
    }
}

/// API key for `kind` from its environment variable; empty values count as missing
pub fn get_api_key(kind: BackendKind) -> Option<String> {
    let var = kind.api_key_env()?;
    env::var(var).ok().filter(|key| !key.trim().is_empty())
}

/// Base URL from `RELAY_AGENT_BASE_URL`, else `fallback`, else the backend default
pub fn get_base_url(kind: BackendKind, fallback: Option<&str>) -> String {
    if let Ok(url) = env::var(BASE_URL_ENV) {
        if !url.trim().is_empty() {
            return url;
        }
    }
    fallback.unwrap_or(kind.default_url()).to_string()
}

/// Model from `RELAY_AGENT_MODEL`, else `fallback`
pub fn get_model(fallback: Option<&str>) -> Option<String> {
    env::var(MODEL_ENV)
        .ok()
        .filter(|m| !m.trim().is_empty())
        .or_else(|| fallback.map(str::to_string))
}

/// Build a backend of the given kind from the environment
pub fn backend_from_env(kind: BackendKind) -> Result<Box<dyn Backend>> {
    let base_url = get_base_url(kind, None);
    log::debug!("Configuring {:?} backend at {}", kind, base_url);

    match kind {
        BackendKind::Claude => {
            let mut backend = ClaudeBackend::new(require_key(kind)?).with_base_url(base_url);
            if let Some(model) = get_model(None) {
                backend = backend.with_model(model);
            }
            Ok(Box::new(backend))
        }
        BackendKind::OpenAi => {
            let mut backend = OpenAiBackend::new(require_key(kind)?).with_base_url(base_url);
            if let Some(model) = get_model(None) {
                backend = backend.with_model(model);
            }
            Ok(Box::new(backend))
        }
        BackendKind::CustomServer => Ok(Box::new(CustomServerBackend::new(base_url))),
    }
}

fn require_key(kind: BackendKind) -> Result<String> {
    get_api_key(kind).ok_or_else(|| {
        Error::config(format!(
            "{} is not set",
            kind.api_key_env().unwrap_or("API key")
        ))
    })
}
