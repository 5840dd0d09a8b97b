//! Tool system
//!
//! This module provides:
//! - `Tool` trait - Interface for implementing tools
//! - `ToolResult` - Result type for tool execution
//! - `ToolRegistry` - Registry for managing available tools
//! - `GuardedTool` - Puts a session authorizer in front of a tool
//! - `common` - Built-in tools (shell, file read/write/patch)

mod guarded;
mod registry;
mod tool;

/// Common/built-in tools
pub mod common;

use std::sync::Arc;

pub use guarded::{denial_message, GuardedTool};
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolResult};

pub use common::{BashTool, FsPatchTool, FsReadTool, FsWriteTool, WorkDirs};

/// Registry with every built-in tool, unguarded
///
/// The shell runs in the first allowed working directory.
pub fn builtin_tools(dirs: Arc<WorkDirs>) -> ToolRegistry {
    let shell_dir = dirs
        .roots()
        .first()
        .cloned()
        .unwrap_or_else(|| std::path::PathBuf::from("."));

    let mut registry = ToolRegistry::new();
    registry.register(BashTool::with_working_dir(shell_dir));
    registry.register(FsReadTool::new(dirs.clone()));
    registry.register(FsWriteTool::new(dirs.clone()));
    registry.register(FsPatchTool::new(dirs));
    registry
}
