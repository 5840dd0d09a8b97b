//! Model backends
//!
//! `AnthropicLoop` talks to the Messages API; `EchoLoop` runs offline.
//! `types` holds the wire types shared with the tool layer.

pub mod anthropic;
pub mod echo;
pub mod types;

pub use anthropic::AnthropicLoop;
pub use echo::EchoLoop;
pub use types::{
    ContentBlock, Message, MessageContent, MessageRequest, MessageResponse, StopReason,
    ToolDefinition, ToolInputSchema, Usage,
};
