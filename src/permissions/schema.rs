//! Permission schema types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Name of the read-only file tool allowed by the fallback schema
const FS_READ_TOOL: &str = "fs_read";

/// Disposition assigned to a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionPolicy {
    /// Run without asking
    #[serde(alias = "ALLOW")]
    Allow,
    /// Ask the user each time (unless allow-listed)
    #[serde(alias = "ASK")]
    Ask,
    /// Never run
    #[serde(alias = "DENY")]
    Deny,
}

/// Per-tool policies plus a schema-wide default
///
/// Loaded once when a session's engine is built and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionSchema {
    /// Schema name (for logs)
    #[serde(default = "default_schema_name")]
    pub name: String,

    /// Policy for tools without an explicit entry
    #[serde(default = "default_policy")]
    pub default_policy: PermissionPolicy,

    /// Explicit per-tool policies
    #[serde(default)]
    pub tools: HashMap<String, PermissionPolicy>,
}

fn default_schema_name() -> String {
    "default".to_string()
}

fn default_policy() -> PermissionPolicy {
    PermissionPolicy::Ask
}

impl PermissionSchema {
    /// Create a schema with no per-tool overrides
    pub fn new(name: impl Into<String>, default_policy: PermissionPolicy) -> Self {
        Self {
            name: name.into(),
            default_policy,
            tools: HashMap::new(),
        }
    }

    /// Set the policy for one tool
    pub fn with_tool(mut self, tool: impl Into<String>, policy: PermissionPolicy) -> Self {
        self.tools.insert(tool.into(), policy);
        self
    }

    /// Resolve the policy for a tool
    pub fn policy_for(&self, tool: &str) -> PermissionPolicy {
        self.tools
            .get(tool)
            .copied()
            .unwrap_or(self.default_policy)
    }
}

impl Default for PermissionSchema {
    /// Ask for everything except reading files
    fn default() -> Self {
        Self::new(default_schema_name(), PermissionPolicy::Ask)
            .with_tool(FS_READ_TOOL, PermissionPolicy::Allow)
    }
}
