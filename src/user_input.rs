//! Human-in-the-loop bridge.
//!
//! An [`Agent`](crate::Agent) owns one [`UserInputBridge`]: a slot holding at most one
//! async handler that turns a prompt into the operator's answer. Tools that need to ask
//! the human something (see [`UserInputTool`](crate::builtin_tools::UserInputTool)) keep a
//! [`WeakUserInputBridge`] instead of a reference to the agent, so the agent can own its
//! tools without a reference cycle. A dropped agent shows up as a failed upgrade.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock, Weak};

/// Registered answer provider: `(prompt) -> answer`
pub type UserInputHandler =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = String> + Send>> + Send + Sync>;

type HandlerSlot = RwLock<Option<UserInputHandler>>;

/// Shared slot for the user-input handler
#[derive(Clone, Default)]
pub struct UserInputBridge {
    slot: Arc<HandlerSlot>,
}

impl UserInputBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler, replacing any previous one
    pub fn set_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        let handler: UserInputHandler = Arc::new(move |prompt| Box::pin(handler(prompt)));
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    pub fn clear_handler(&self) {
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn has_handler(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Ask the operator. Returns `None` when no handler is registered.
    pub async fn ask(&self, prompt: &str) -> Option<String> {
        // Clone the handler out so the lock is not held across the await
        let handler = self
            .slot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()?;
        Some(handler(prompt.to_string()).await)
    }

    pub fn downgrade(&self) -> WeakUserInputBridge {
        WeakUserInputBridge {
            slot: Arc::downgrade(&self.slot),
        }
    }
}

impl std::fmt::Debug for UserInputBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserInputBridge")
            .field("has_handler", &self.has_handler())
            .finish()
    }
}

/// Non-owning handle to a [`UserInputBridge`]
#[derive(Clone, Debug, Default)]
pub struct WeakUserInputBridge {
    slot: Weak<HandlerSlot>,
}

impl WeakUserInputBridge {
    /// `None` once the owning agent has been dropped
    pub fn upgrade(&self) -> Option<UserInputBridge> {
        self.slot.upgrade().map(|slot| UserInputBridge { slot })
    }
}
