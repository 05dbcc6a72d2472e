//! Seam to the host agent runtime and per-call runtime bindings.
//!
//! Text generation is an external capability of the host framework; this
//! crate only needs a prompt-in, text-out surface. Each live call is bound
//! to exactly one runtime handle for its duration.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{TelephonyError, TelephonyResult};

/// Host-runtime text generation capability
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Generate a reply for `prompt`
    async fn generate_text(&self, prompt: &str) -> TelephonyResult<String>;
}

impl std::fmt::Debug for dyn AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn AgentRuntime")
    }
}

/// Fixed-response runtime for the standalone binary and tests
pub struct StaticRuntime {
    reply: String,
}

impl StaticRuntime {
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl AgentRuntime for StaticRuntime {
    async fn generate_text(&self, _prompt: &str) -> TelephonyResult<String> {
        Ok(self.reply.clone())
    }
}

/// CallSid -> runtime handle map
///
/// A binding is established on first contact (incoming) or at initiation
/// (outgoing) and removed at call cleanup. Mutation is last-writer-wins;
/// each call id has a single expected writer.
#[derive(Default)]
pub struct CallBindings {
    inner: Arc<RwLock<HashMap<String, Arc<dyn AgentRuntime>>>>,
}

impl CallBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bind(&self, call_sid: &str, runtime: Arc<dyn AgentRuntime>) {
        let mut inner = self.inner.write().await;
        inner.insert(call_sid.to_string(), runtime);
        debug!("Bound runtime for call {}", call_sid);
    }

    pub async fn get(&self, call_sid: &str) -> Option<Arc<dyn AgentRuntime>> {
        let inner = self.inner.read().await;
        inner.get(call_sid).cloned()
    }

    /// Returns the bound runtime, or an error a caller can surface as a
    /// call-not-found condition.
    pub async fn require(&self, call_sid: &str) -> TelephonyResult<Arc<dyn AgentRuntime>> {
        self.get(call_sid)
            .await
            .ok_or_else(|| TelephonyError::CallNotFound(call_sid.to_string()))
    }

    pub async fn remove(&self, call_sid: &str) {
        let mut inner = self.inner.write().await;
        if inner.remove(call_sid).is_some() {
            debug!("Removed runtime binding for call {}", call_sid);
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_get_remove() {
        let bindings = CallBindings::new();
        let runtime: Arc<dyn AgentRuntime> = Arc::new(StaticRuntime::with_reply("ok"));

        bindings.bind("CA123", runtime).await;
        assert!(bindings.get("CA123").await.is_some());
        assert!(bindings.require("CA123").await.is_ok());

        bindings.remove("CA123").await;
        assert!(bindings.get("CA123").await.is_none());
        assert!(matches!(
            bindings.require("CA123").await.unwrap_err(),
            TelephonyError::CallNotFound(_)
        ));
    }
}
