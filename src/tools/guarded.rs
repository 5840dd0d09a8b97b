//! Check-then-invoke decorator
//!
//! `GuardedTool` wraps any tool so that every call goes through the
//! session's [`Authorizer`] first. A refused call never reaches the inner
//! tool; the model sees a plain denial message instead.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::tool::{Tool, ToolResult};
use crate::llm::ToolDefinition;
use crate::permissions::Authorizer;

/// Message returned to the model for a refused call
pub fn denial_message(tool: &str) -> String {
    format!("Execution denied: '{}' was not permitted to run.", tool)
}

/// A tool with an authorizer in front of it
pub struct GuardedTool {
    inner: Arc<dyn Tool>,
    authorizer: Arc<Authorizer>,
}

impl GuardedTool {
    pub fn new(inner: Arc<dyn Tool>, authorizer: Arc<Authorizer>) -> Self {
        Self { inner, authorizer }
    }

    pub fn inner(&self) -> &Arc<dyn Tool> {
        &self.inner
    }
}

#[async_trait]
impl Tool for GuardedTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn definition(&self) -> ToolDefinition {
        self.inner.definition()
    }

    async fn execute(&self, input: &Value) -> Result<ToolResult> {
        let name = self.inner.name();
        if !self.authorizer.check(name, input).await {
            tracing::info!(tool = %name, "Tool call refused");
            return Ok(ToolResult::error(denial_message(name)));
        }
        self.inner.execute(input).await
    }
}
