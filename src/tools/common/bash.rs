//! Shell tool
//!
//! Runs a command through `bash -c` in the configured working directory.
//! There is no sandbox: the command has the host user's permissions and is
//! bounded only by a wall-clock timeout.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use super::super::tool::{Tool, ToolResult};
use crate::llm::{ToolDefinition, ToolInputSchema};
use crate::permissions::SHELL_TOOL;

/// Hard limit on a single command
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
/// Maximum output length in bytes
const MAX_OUTPUT_LENGTH: usize = 30000;

/// Shell tool
pub struct BashTool {
    working_dir: PathBuf,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct BashInput {
    command: String,
}

impl BashTool {
    /// Create a shell tool running in the current directory
    pub fn new() -> Result<Self> {
        Ok(Self::with_working_dir(std::env::current_dir()?))
    }

    pub fn with_working_dir(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            timeout: COMMAND_TIMEOUT,
        }
    }

    /// Override the command timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run a command, returning `None` on timeout
    async fn run_command(&self, command: &str) -> Result<Option<(String, i32)>> {
        tracing::info!(command = %command, "Executing shell command");
        tracing::debug!("Working directory: {}", self.working_dir.display());

        let output_future = Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.timeout, output_future).await {
            Ok(result) => result?,
            Err(_) => return Ok(None),
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut result = stdout.into_owned();
        if !stderr.is_empty() {
            result.push_str("\nSTDERR:\n");
            result.push_str(&stderr);
        }

        if result.len() > MAX_OUTPUT_LENGTH {
            let mut cut = MAX_OUTPUT_LENGTH;
            while !result.is_char_boundary(cut) {
                cut -= 1;
            }
            result.truncate(cut);
            result.push_str("\n... (output truncated)");
        }

        tracing::debug!(exit_code, output_len = result.len(), "Command finished");

        Ok(Some((result, exit_code)))
    }
}

impl Default for BashTool {
    fn default() -> Self {
        Self::with_working_dir(".")
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        SHELL_TOOL
    }

    fn description(&self) -> &str {
        "Execute a bash command on the local system and return its output."
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            SHELL_TOOL,
            "Executes a bash command on the local system. Returns stdout, followed by \
             a STDERR section when the command wrote to stderr. Commands are killed \
             after 30 seconds.",
            ToolInputSchema::new()
                .with_properties(json!({
                    "command": {
                        "type": "string",
                        "description": "The bash command to execute"
                    }
                }))
                .with_required(&["command"]),
        )
    }

    async fn execute(&self, input: &Value) -> Result<ToolResult> {
        let bash_input: BashInput = serde_json::from_value(input.clone())
            .map_err(|e| anyhow::anyhow!("Invalid bash input: {}", e))?;

        match self.run_command(&bash_input.command).await {
            Ok(Some((output, 0))) => Ok(ToolResult::success(output)),
            Ok(Some((output, exit_code))) => Ok(ToolResult::error(format!(
                "Command failed with exit code {}\n{}",
                exit_code, output
            ))),
            Ok(None) => {
                tracing::warn!(command = %bash_input.command, "Shell command timed out");
                Ok(ToolResult::error(format!(
                    "Error: Command timed out after {} seconds.",
                    self.timeout.as_secs()
                )))
            }
            Err(e) => Ok(ToolResult::error(format!("Error executing command: {}", e))),
        }
    }
}
