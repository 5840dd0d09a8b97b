//! Tool trait definition
//!
//! All tools implement this trait to provide a consistent interface.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::ToolDefinition;

/// Result of executing a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The output of the tool
    pub output: String,
    /// Whether the tool execution resulted in an error
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    /// Create an error tool result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: message.into(),
            is_error: true,
        }
    }
}

/// Trait for tools the model can call
///
/// Tools never see the permission layer; wrap them in a
/// [`GuardedTool`](super::GuardedTool) to put an authorizer in front.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model calls this tool by
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Definition advertised to the model
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given input
    ///
    /// Expected failures (missing file, non-zero exit) come back as
    /// `ToolResult::error`; `Err` is for malformed input.
    async fn execute(&self, input: &Value) -> Result<ToolResult>;
}
