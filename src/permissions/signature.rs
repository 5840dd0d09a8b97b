//! Allow-list signatures
//!
//! Pure functions that reduce a tool invocation to the string key stored in a
//! session allow-list. Three granularities exist:
//! - [`exact`] - this tool with exactly these arguments
//! - [`tool_wide`] - this tool with any arguments
//! - [`shell_command`] - any invocation of one base executable through the shell tool

use serde_json::Value;

/// Name of the shell-execution tool
pub const SHELL_TOOL: &str = "bash_execute";

/// Tokens that chain, pipe or redirect commands
const CONTROL_OPERATORS: &[&str] = &["&&", "||", ";", "|", ">", ">>", "<", "&"];

/// Commands that wrap another command
const WRAPPER_PREFIXES: &[&str] = &["sudo", "timeout", "nohup", "nice", "time"];

/// `KEY=VALUE` prefix, as in `FOO=bar make`
fn is_assignment(token: &str) -> bool {
    token.contains('=') && !token.starts_with('-')
}

/// Signature for this exact call
///
/// Object keys are sorted at every depth so that argument order never
/// changes the key.
pub fn exact(tool: &str, args: &Value) -> String {
    let mut out = String::with_capacity(tool.len() + 32);
    out.push_str(tool);
    out.push(':');
    write_canonical(args, &mut out);
    out
}

/// Signature covering every call of a tool
pub fn tool_wide(tool: &str, _args: &Value) -> String {
    format!("{}:*", tool)
}

/// Signature covering every shell call of one base executable
///
/// Returns `None` whenever the command cannot be safely generalized: it is
/// missing or unparseable, chains/pipes/redirects, or a flag shows up before
/// any command name (e.g. `sudo -u bob ls`). Callers then fall back to [`exact`].
pub fn shell_command(_tool: &str, args: &Value) -> Option<String> {
    let command = args.get("command").and_then(|v| v.as_str())?;
    if command.trim().is_empty() {
        return None;
    }

    let tokens = split_shell_words(command)?;

    if tokens
        .iter()
        .any(|t| CONTROL_OPERATORS.contains(&t.as_str()))
    {
        return None;
    }

    for token in &tokens {
        if is_assignment(token) {
            continue;
        }
        if WRAPPER_PREFIXES.contains(&token.as_str()) {
            continue;
        }
        if token.starts_with('-') {
            return None;
        }
        return Some(format!("bash:{}", token));
    }

    None
}

/// Split a command line into words using POSIX shell quoting rules
///
/// Returns `None` on an unterminated quote or trailing escape.
pub fn split_shell_words(input: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '\'' => break,
                        ch => current.push(ch),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '"' => break,
                        '\\' => {
                            let next = chars.next()?;
                            // Inside double quotes a backslash only escapes these
                            if !matches!(next, '"' | '\\' | '$' | '`' | '\n') {
                                current.push('\\');
                            }
                            if next != '\n' {
                                current.push(next);
                            }
                        }
                        ch => current.push(ch),
                    }
                }
            }
            '\\' => {
                let next = chars.next()?;
                if next != '\n' {
                    in_word = true;
                    current.push(next);
                }
            }
            ch => {
                in_word = true;
                current.push(ch);
            }
        }
    }

    if in_word {
        words.push(current);
    }

    Some(words)
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
