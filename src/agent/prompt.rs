//! System prompt assembly
//!
//! Precedence: the profile's inline prompt, else its context files, else the
//! standard context files (system, user, project), else a built-in default.

use std::path::{Path, PathBuf};

use crate::config::{Profile, HOME_DIR_NAME};

/// Context file name looked up in the standard locations
const CONTEXT_FILE: &str = "AGENT.md";

/// Used when nothing else provides a prompt
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a capable, proactive assistant with access to \
the local machine through tools. Prefer finding information yourself (read files, run `ls` or \
`grep`) over asking the user for it. Some tool calls need the user's approval; if a call is \
denied, explain what you wanted to do and suggest an alternative.";

/// Standard context locations, most general first
pub fn standard_context_paths() -> Vec<PathBuf> {
    let mut paths = vec![Path::new("/etc/shadow-relay").join(CONTEXT_FILE)];
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(HOME_DIR_NAME).join(CONTEXT_FILE));
    }
    paths.push(PathBuf::from(HOME_DIR_NAME).join(CONTEXT_FILE));
    paths
}

fn expand(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// Concatenate the readable, non-blank files among `paths`
pub async fn load_context(paths: &[PathBuf]) -> String {
    let mut sections = Vec::new();

    for path in paths {
        if !path.is_file() {
            continue;
        }
        match tokio::fs::read_to_string(path).await {
            Ok(content) if !content.trim().is_empty() => {
                tracing::debug!(path = %path.display(), "Loaded context file");
                sections.push(format!("--- Context from {} ---\n{}\n", path.display(), content));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read context file");
            }
        }
    }

    sections.join("\n")
}

/// Build the system prompt for a profile
pub async fn system_prompt_for(profile: &Profile) -> String {
    if let Some(prompt) = profile.system_prompt.as_deref() {
        if !prompt.trim().is_empty() {
            return prompt.to_string();
        }
    }

    let paths: Vec<PathBuf> = if profile.context_files.is_empty() {
        standard_context_paths()
    } else {
        profile.context_files.iter().map(|p| expand(p)).collect()
    };

    let context = load_context(&paths).await;
    if context.is_empty() {
        DEFAULT_SYSTEM_PROMPT.to_string()
    } else {
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_inline_prompt_wins() {
        let profile = Profile::new("p").with_system_prompt("Be brief.");
        assert_eq!(system_prompt_for(&profile).await, "Be brief.");
    }

    #[tokio::test]
    async fn test_context_files_in_order() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("first.md");
        let blank = temp.path().join("blank.md");
        let second = temp.path().join("second.md");
        std::fs::write(&first, "alpha").unwrap();
        std::fs::write(&blank, "   \n").unwrap();
        std::fs::write(&second, "beta").unwrap();

        let mut profile = Profile::new("p");
        profile.context_files = vec![
            first.display().to_string(),
            blank.display().to_string(),
            temp.path().join("missing.md").display().to_string(),
            second.display().to_string(),
        ];

        let prompt = system_prompt_for(&profile).await;
        let alpha = prompt.find("alpha").unwrap();
        let beta = prompt.find("beta").unwrap();
        assert!(alpha < beta);
        assert!(prompt.starts_with("--- Context from "));
        assert!(!prompt.contains("blank.md"));
    }

    #[tokio::test]
    async fn test_no_context_uses_default() {
        let temp = TempDir::new().unwrap();
        let mut profile = Profile::new("p");
        profile.context_files = vec![temp.path().join("none.md").display().to_string()];

        assert_eq!(system_prompt_for(&profile).await, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_standard_paths_order() {
        let paths = standard_context_paths();
        assert_eq!(paths.first().unwrap(), Path::new("/etc/shadow-relay/AGENT.md"));
        assert_eq!(paths.last().unwrap(), Path::new(".shadow-relay/AGENT.md"));
    }
}
