//! File tools: `fs_read`, `fs_write`, `fs_patch`
//!
//! All three resolve their `path` against a base directory and refuse
//! anything outside the configured working directories. Paths that do not
//! exist yet are resolved through their closest existing ancestor, so a new
//! file under an allowed root is fine but `..` and symlinks cannot escape.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use similar::TextDiff;

use super::super::tool::{Tool, ToolResult};
use crate::llm::{ToolDefinition, ToolInputSchema};

/// Lines of context around a patch in the returned diff
const DIFF_CONTEXT: usize = 3;

/// The directories file tools may touch
#[derive(Debug, Clone)]
pub struct WorkDirs {
    base: PathBuf,
    roots: Vec<PathBuf>,
    configured: Vec<String>,
}

impl WorkDirs {
    /// Roots are resolved relative to `base`, which also anchors relative tool paths
    pub fn new(base: impl Into<PathBuf>, allowed: &[String]) -> Self {
        let base = base.into();
        let configured: Vec<String> = if allowed.is_empty() {
            vec![".".to_string()]
        } else {
            allowed.to_vec()
        };
        let roots = configured
            .iter()
            .map(|dir| resolve_lenient(&base, &expand_home(dir)))
            .collect();
        Self {
            base,
            roots,
            configured,
        }
    }

    /// Anchor relative paths at the process working directory
    pub fn current(allowed: &[String]) -> Result<Self> {
        Ok(Self::new(std::env::current_dir()?, allowed))
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Resolve a tool-supplied path, or explain why it is refused
    pub fn resolve(&self, raw: &str) -> std::result::Result<PathBuf, String> {
        let resolved = resolve_lenient(&self.base, &expand_home(raw));
        if self.roots.iter().any(|root| resolved.starts_with(root)) {
            Ok(resolved)
        } else {
            tracing::warn!(path = %raw, "Path outside allowed working directories");
            Err(format!(
                "Error: Access Denied. Path '{}' is outside the allowed working directories: {:?}",
                raw, self.configured
            ))
        }
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        if raw == "~" {
            return PathBuf::from(home);
        }
        if let Some(rest) = raw.strip_prefix("~/") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(raw)
}

/// Absolute, `..`-free path with symlinks resolved as far as the path exists
fn resolve_lenient(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    for ancestor in normalized.ancestors() {
        if let Ok(real) = ancestor.canonicalize() {
            return match normalized.strip_prefix(ancestor) {
                Ok(rest) if !rest.as_os_str().is_empty() => real.join(rest),
                _ => real,
            };
        }
    }
    normalized
}

// ============================================================================
// fs_read
// ============================================================================

/// Read a text file
pub struct FsReadTool {
    dirs: Arc<WorkDirs>,
}

#[derive(Debug, Deserialize)]
struct ReadInput {
    path: String,
}

impl FsReadTool {
    pub fn new(dirs: Arc<WorkDirs>) -> Self {
        Self { dirs }
    }
}

#[async_trait]
impl Tool for FsReadTool {
    fn name(&self) -> &str {
        "fs_read"
    }

    fn description(&self) -> &str {
        "Read the content of a file from the local filesystem."
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            self.name(),
            "Reads the text content of a file. Paths may be relative to the working directory.",
            ToolInputSchema::new()
                .with_properties(json!({
                    "path": {"type": "string", "description": "Path of the file to read"}
                }))
                .with_required(&["path"]),
        )
    }

    async fn execute(&self, input: &Value) -> Result<ToolResult> {
        let input: ReadInput = serde_json::from_value(input.clone())
            .map_err(|e| anyhow::anyhow!("Invalid fs_read input: {}", e))?;

        let path = match self.dirs.resolve(&input.path) {
            Ok(path) => path,
            Err(denied) => return Ok(ToolResult::error(denied)),
        };

        if !path.is_file() {
            return Ok(ToolResult::error(format!(
                "Error: File {} does not exist.",
                input.path
            )));
        }

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(ToolResult::success(content)),
            Err(e) => Ok(ToolResult::error(format!("Error reading file: {}", e))),
        }
    }
}

// ============================================================================
// fs_write
// ============================================================================

/// Write or append to a text file
pub struct FsWriteTool {
    dirs: Arc<WorkDirs>,
}

#[derive(Debug, Deserialize)]
struct WriteInput {
    path: String,
    content: String,
    #[serde(default)]
    append: bool,
}

impl FsWriteTool {
    pub fn new(dirs: Arc<WorkDirs>) -> Self {
        Self { dirs }
    }
}

#[async_trait]
impl Tool for FsWriteTool {
    fn name(&self) -> &str {
        "fs_write"
    }

    fn description(&self) -> &str {
        "Write content to a file, replacing it or appending to it."
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            self.name(),
            "Writes text to a file. Overwrites by default; set append to add to the end instead.",
            ToolInputSchema::new()
                .with_properties(json!({
                    "path": {"type": "string", "description": "Destination file path"},
                    "content": {"type": "string", "description": "Text to write"},
                    "append": {"type": "boolean", "description": "Append instead of overwriting (default false)"}
                }))
                .with_required(&["path", "content"]),
        )
    }

    async fn execute(&self, input: &Value) -> Result<ToolResult> {
        let input: WriteInput = serde_json::from_value(input.clone())
            .map_err(|e| anyhow::anyhow!("Invalid fs_write input: {}", e))?;

        let path = match self.dirs.resolve(&input.path) {
            Ok(path) => path,
            Err(denied) => return Ok(ToolResult::error(denied)),
        };

        let written = if input.append {
            append_file(&path, &input.content).await
        } else {
            tokio::fs::write(&path, &input.content).await
        };

        match written {
            Ok(()) => {
                let mode = if input.append { "append" } else { "overwrite" };
                tracing::info!(path = %path.display(), mode, "File written");
                Ok(ToolResult::success(format!(
                    "Successfully wrote to {} (mode={})",
                    input.path, mode
                )))
            }
            Err(e) => Ok(ToolResult::error(format!("Error writing file: {}", e))),
        }
    }
}

async fn append_file(path: &Path, content: &str) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}

// ============================================================================
// fs_patch
// ============================================================================

/// Replace text within an optional line range and report a diff
pub struct FsPatchTool {
    dirs: Arc<WorkDirs>,
}

#[derive(Debug, Deserialize)]
struct PatchInput {
    path: String,
    target: String,
    replacement: String,
    #[serde(default = "default_start_line")]
    start_line: usize,
    /// Inclusive, 1-based; absent or negative means end of file
    #[serde(default)]
    end_line: Option<i64>,
}

fn default_start_line() -> usize {
    1
}

impl FsPatchTool {
    pub fn new(dirs: Arc<WorkDirs>) -> Self {
        Self { dirs }
    }
}

/// Replace the first occurrence of `target` inside lines `start..=end`
///
/// Returns `None` when the target is not in that range.
pub fn patch_text(
    original: &str,
    target: &str,
    replacement: &str,
    start_line: usize,
    end_line: Option<usize>,
) -> Option<String> {
    let lines: Vec<&str> = original.split_inclusive('\n').collect();
    let start = start_line.saturating_sub(1).min(lines.len());
    let end = end_line.unwrap_or(lines.len()).clamp(start, lines.len());

    let segment: String = lines[start..end].concat();
    if target.is_empty() || !segment.contains(target) {
        return None;
    }

    let mut patched = lines[..start].concat();
    patched.push_str(&segment.replacen(target, replacement, 1));
    patched.push_str(&lines[end..].concat());
    Some(patched)
}

/// Unified diff between two versions of a file, empty when they match
pub fn unified_diff(path: &str, old: &str, new: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(DIFF_CONTEXT)
        .header(&format!("a/{}", path), &format!("b/{}", path))
        .to_string()
}

#[async_trait]
impl Tool for FsPatchTool {
    fn name(&self) -> &str {
        "fs_patch"
    }

    fn description(&self) -> &str {
        "Replace exact text in a file, optionally within a line range, and return a diff."
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            self.name(),
            "Replaces the first occurrence of target with replacement, searching only lines \
             start_line..=end_line (1-based). Whitespace must match exactly. Returns a unified diff.",
            ToolInputSchema::new()
                .with_properties(json!({
                    "path": {"type": "string", "description": "File to modify"},
                    "target": {"type": "string", "description": "Exact text to replace"},
                    "replacement": {"type": "string", "description": "New text"},
                    "start_line": {"type": "integer", "description": "First line to search (default 1)"},
                    "end_line": {"type": "integer", "description": "Last line to search (default end of file)"}
                }))
                .with_required(&["path", "target", "replacement"]),
        )
    }

    async fn execute(&self, input: &Value) -> Result<ToolResult> {
        let input: PatchInput = serde_json::from_value(input.clone())
            .map_err(|e| anyhow::anyhow!("Invalid fs_patch input: {}", e))?;

        let path = match self.dirs.resolve(&input.path) {
            Ok(path) => path,
            Err(denied) => return Ok(ToolResult::error(denied)),
        };

        if !path.is_file() {
            return Ok(ToolResult::error(format!(
                "Error: File {} not found.",
                input.path
            )));
        }

        let original = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => return Ok(ToolResult::error(format!("Error patching file: {}", e))),
        };

        let end_line = input
            .end_line
            .and_then(|n| usize::try_from(n).ok());
        let Some(patched) = patch_text(
            &original,
            &input.target,
            &input.replacement,
            input.start_line,
            end_line,
        ) else {
            let end_label = end_line.map_or_else(|| "end".to_string(), |n| n.to_string());
            return Ok(ToolResult::error(format!(
                "Error: Target text not found in lines {}-{} of {}. \
                 Please ensure exact match (whitespace matters).",
                input.start_line, end_label, input.path
            )));
        };

        if let Err(e) = tokio::fs::write(&path, &patched).await {
            return Ok(ToolResult::error(format!("Error patching file: {}", e)));
        }

        tracing::info!(path = %path.display(), "File patched");
        Ok(ToolResult::success(format!(
            "Successfully patched {}.\n\nDiff:\n{}",
            input.path,
            unified_diff(&input.path, &original, &patched)
        )))
    }
}
