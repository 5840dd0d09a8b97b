//! Event emission seam
//!
//! Components that need to publish events to a session (the authorizer's
//! approval prompts, most notably) hold an `Arc<dyn EventEmitter>` instead of
//! a reference to the registry.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::event::AgentEvent;

/// Sink for events addressed to one session
///
/// Emission is infallible from the caller's point of view; delivery
/// problems are the emitter's business.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(&self, event: AgentEvent);
}

/// Emitter that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEmitter;

#[async_trait]
impl EventEmitter for NullEmitter {
    async fn emit(&self, _event: AgentEvent) {}
}

#[async_trait]
impl EventEmitter for mpsc::UnboundedSender<AgentEvent> {
    async fn emit(&self, event: AgentEvent) {
        if self.send(event).is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }
}

#[async_trait]
impl EventEmitter for mpsc::Sender<AgentEvent> {
    async fn emit(&self, event: AgentEvent) {
        if self.send(event).await.is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }
}
