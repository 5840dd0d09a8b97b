//! Tool registry for managing available tools
//!
//! The registry holds all tools that are available to one agent engine.
//! Engines build theirs by wrapping a shared base registry with the
//! session's authorizer via [`ToolRegistry::guarded`].

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

use super::guarded::GuardedTool;
use super::tool::{Tool, ToolResult};
use crate::llm::ToolDefinition;
use crate::permissions::Authorizer;

/// Registry that holds all available tools
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register an already shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        tracing::debug!("[ToolRegistry] Registering tool: {}", name);
        self.tools.insert(name, tool);
    }

    /// Copy of this registry with every tool behind `authorizer`
    pub fn guarded(&self, authorizer: &Arc<Authorizer>) -> ToolRegistry {
        let tools = self
            .tools
            .iter()
            .map(|(name, tool)| {
                let guarded: Arc<dyn Tool> =
                    Arc::new(GuardedTool::new(tool.clone(), authorizer.clone()));
                (name.clone(), guarded)
            })
            .collect();
        ToolRegistry { tools }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool definitions for the model, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, input: &Value) -> Result<ToolResult> {
        let tool = self
            .tools
            .get(name)
            .with_context(|| format!("Tool not found: {}", name))?;

        tracing::info!(tool = %name, "Executing tool");
        tracing::debug!("Input: {:?}", input);

        let result = tool.execute(input).await?;

        tracing::debug!(tool = %name, is_error = result.is_error, "Tool completed");

        Ok(result)
    }

    /// Get the list of tool names, sorted
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NullEmitter;
    use crate::permissions::{PermissionPolicy, PermissionSchema};
    use crate::tools::BashTool;
    use serde_json::json;

    #[test]
    fn test_empty_registry() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.get("nonexistent").is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error() {
        let registry = ToolRegistry::new();
        let err = registry.execute("missing", &json!({})).await.unwrap_err();
        assert!(err.to_string().contains("Tool not found: missing"));
    }

    #[tokio::test]
    async fn test_guarded_copy_applies_policy() {
        let mut registry = ToolRegistry::new();
        registry.register(BashTool::default());

        let schema = PermissionSchema::new("test", PermissionPolicy::Deny);
        let authorizer = Arc::new(Authorizer::new(schema, Arc::new(NullEmitter)));
        let guarded = registry.guarded(&authorizer);

        assert_eq!(guarded.tool_names(), vec!["bash_execute"]);
        let result = guarded
            .execute("bash_execute", &json!({"command": "echo hi"}))
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.output.starts_with("Execution denied"));
    }
}
