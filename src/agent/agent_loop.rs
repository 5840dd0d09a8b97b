//! Agent loop seam
//!
//! An `AgentLoop` turns one user message into a stream of events: text as
//! `token`s, each tool call as a `tool_start`/`tool_end` pair. It calls tools
//! through the registry it is handed, which is already guarded by the
//! session's authorizer, so a loop never deals with permissions itself.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;

use crate::core::AgentEvent;
use crate::session::TurnRecord;
use crate::tools::ToolRegistry;

/// Events of one turn, in emission order
pub type EventStream = Pin<Box<dyn Stream<Item = anyhow::Result<AgentEvent>> + Send>>;

/// Everything a loop needs for one turn
#[derive(Clone)]
pub struct TurnRequest {
    pub system_prompt: String,

    /// Conversation so far, not including `input`
    pub history: Vec<TurnRecord>,

    /// The new user message
    pub input: String,

    /// Tools the model may call (guarded)
    pub tools: Arc<ToolRegistry>,
}

/// Drives the model for one conversational turn
///
/// The returned stream must not emit `finish`; the engine closes the turn.
/// An `Err` item aborts the turn.
pub trait AgentLoop: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    fn run_turn(&self, request: TurnRequest) -> EventStream;
}
