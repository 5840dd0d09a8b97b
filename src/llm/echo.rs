//! Offline agent loop
//!
//! Echoes the user's message back as tokens. A message starting with `!`
//! is run as a shell command through the (guarded) shell tool instead, which
//! makes the approval flow usable without a model.

use std::time::Duration;

use serde_json::json;

use crate::agent::{AgentLoop, EventStream, TurnRequest};
use crate::core::AgentEvent;
use crate::permissions::SHELL_TOOL;
use crate::tools::ToolResult;

/// Echo loop
#[derive(Debug, Clone, Default)]
pub struct EchoLoop {
    token_delay: Option<Duration>,
}

impl EchoLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause between tokens, to make streaming visible
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = Some(delay);
        self
    }
}

impl AgentLoop for EchoLoop {
    fn name(&self) -> &str {
        "echo"
    }

    fn run_turn(&self, request: TurnRequest) -> EventStream {
        let delay = self.token_delay;

        Box::pin(async_stream::try_stream! {
            if let Some(command) = request.input.trim().strip_prefix('!') {
                let input = json!({ "command": command.trim() });
                yield AgentEvent::tool_start(SHELL_TOOL, input.clone());

                let result = match request.tools.execute(SHELL_TOOL, &input).await {
                    Ok(result) => result,
                    Err(e) => ToolResult::error(e.to_string()),
                };
                let summary = if result.is_error { "Command did not succeed." } else { "Done." };
                yield AgentEvent::tool_end(SHELL_TOOL, result.output);
                yield AgentEvent::token(summary);
            } else {
                let reply = format!("You said: {}", request.input);
                for word in reply.split_inclusive(' ') {
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    yield AgentEvent::token(word);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EventType, NullEmitter};
    use crate::permissions::{Authorizer, PermissionPolicy, PermissionSchema};
    use crate::tools::{BashTool, ToolRegistry};
    use futures::StreamExt;
    use std::sync::Arc;

    fn request(input: &str, tools: ToolRegistry) -> TurnRequest {
        TurnRequest {
            system_prompt: String::new(),
            history: Vec::new(),
            input: input.to_string(),
            tools: Arc::new(tools),
        }
    }

    async fn run(input: &str, tools: ToolRegistry) -> Vec<AgentEvent> {
        EchoLoop::new()
            .run_turn(request(input, tools))
            .map(|item| item.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_echo_tokens() {
        let events = run("hello there", ToolRegistry::new()).await;
        let text: String = events.iter().map(|e| e.content.as_str()).collect();

        assert!(events.iter().all(|e| e.event_type == EventType::Token));
        assert_eq!(text, "You said: hello there");
    }

    #[tokio::test]
    async fn test_bang_runs_shell() {
        let mut tools = ToolRegistry::new();
        tools.register(BashTool::default());

        let events = run("!echo relay", tools).await;
        assert_eq!(events[0].event_type, EventType::ToolStart);
        assert_eq!(events[0].metadata["input"]["command"], "echo relay");
        assert_eq!(events[1].event_type, EventType::ToolEnd);
        assert_eq!(events[1].content, "relay\n");
        assert_eq!(events[2].content, "Done.");
    }

    #[tokio::test]
    async fn test_bang_respects_policy() {
        let mut base = ToolRegistry::new();
        base.register(BashTool::default());
        let schema = PermissionSchema::new("test", PermissionPolicy::Deny);
        let authorizer = Arc::new(Authorizer::new(schema, Arc::new(NullEmitter)));

        let events = run("!echo nope", base.guarded(&authorizer)).await;
        assert_eq!(
            events[1].content,
            "Execution denied: 'bash_execute' was not permitted to run."
        );
        assert_eq!(events[2].content, "Command did not succeed.");
    }
}
