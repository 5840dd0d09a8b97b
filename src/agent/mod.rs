//! Agent layer
//!
//! This module provides:
//! - `AgentLoop` - The seam a model backend implements for one turn
//! - `AgentEngine` - Per-session history, authorizer and guarded tools
//! - `EngineFactory` - Builds engines from configured profiles
//! - `prompt` - System prompt assembly from context files

pub mod agent_loop;
pub mod engine;
pub mod factory;
pub mod prompt;

pub use agent_loop::{AgentLoop, EventStream, TurnRequest};
pub use engine::AgentEngine;
pub use factory::{EngineFactory, ProfileEngineFactory};
pub use prompt::{system_prompt_for, DEFAULT_SYSTEM_PROMPT};
