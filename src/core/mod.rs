//! Core types for the relay
//!
//! This module provides the fundamental types used throughout the crate:
//! - `AgentEvent` / `EventType` - The wire envelope broadcast to clients
//! - `ClientMessage` - Messages clients send back
//! - `EventEmitter` - Where session-scoped events are published
//! - `RelayError` - Error types

pub mod emitter;
pub mod error;
pub mod event;

pub use emitter::{EventEmitter, NullEmitter};
pub use error::{RelayError, RelayResult};
pub use event::{AgentEvent, ClientMessage, EventType};
