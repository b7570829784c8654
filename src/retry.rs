//! Caller-side retries with exponential backoff
//!
//! The agent never retries a failed round on its own: a half-finished tool round may
//! already have had side effects. Callers that know a retry is safe can wrap the call.
//!
//! ```rust,no_run
//! use relay_agent::retry::{retry_with_backoff_conditional, RetryConfig};
//! use relay_agent::backend::{Backend, ClaudeBackend};
//! use relay_agent::{Conversation, Message};
//! use std::time::Duration;
//!
//! # async fn example() -> relay_agent::Result<()> {
//! let backend = ClaudeBackend::new("sk-ant-...");
//! let convo = Conversation::with_messages(vec![Message::user("Hello")]);
//! let config = RetryConfig::default()
//!     .with_max_attempts(4)
//!     .with_initial_delay(Duration::from_millis(500));
//!
//! let reply = retry_with_backoff_conditional(config, || backend.send(&convo, &[])).await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    pub initial_delay: Duration,

    /// Upper bound for a single delay, before jitter
    pub max_delay: Duration,

    /// Growth factor per attempt (2.0 doubles the delay each time)
    pub backoff_multiplier: f64,

    /// Fraction of the delay randomized around its nominal value (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Clamped to `0.0..=1.0`
    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt + 1`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let exponential = base_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped = exponential.min(self.max_delay.as_millis() as f64);

        let jitter_range = capped * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range;
        let delay = capped + jitter - (jitter_range / 2.0);

        Duration::from_millis(delay.max(0.0) as u64)
    }
}

/// Whether an error is worth another attempt.
///
/// Throttling, 5xx failures and transport errors are transient. Authentication,
/// malformed payloads, configuration and tool errors are not.
pub fn is_retryable_error(error: &Error) -> bool {
    matches!(
        error,
        Error::RateLimitExceeded | Error::Server(_) | Error::Network(_)
    )
}

/// Retry `operation` on any error
pub async fn retry_with_backoff<F, Fut, T>(config: RetryConfig, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(config, operation, |_| true).await
}

/// Retry `operation` only while it fails with a [retryable](is_retryable_error) error
pub async fn retry_with_backoff_conditional<F, Fut, T>(
    config: RetryConfig,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(config, operation, is_retryable_error).await
}

async fn retry_when<F, Fut, T, P>(config: RetryConfig, mut operation: F, retryable: P) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&Error) -> bool,
{
    if config.max_attempts == 0 {
        return Err(Error::config("max_attempts must be at least 1"));
    }

    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !retryable(&err) || attempt + 1 >= config.max_attempts => return Err(err),
            Err(err) => {
                let delay = config.delay_for(attempt);
                log::debug!(
                    "Attempt {} failed ({}), retrying in {:?}",
                    attempt + 1,
                    err,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
