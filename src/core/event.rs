//! Wire envelope shared by every client of a session
//!
//! Everything a client sees is an [`AgentEvent`]: one JSON object per
//! WebSocket text frame, shaped `{type, content, metadata}`. Clients talk
//! back with [`ClientMessage`]s (chat lines, approval decisions, commands).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::RelayResult;
use crate::permissions::ApprovalDecision;

/// Kind of an event envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    System,
    UserInput,
    Token,
    ToolStart,
    ToolEnd,
    Error,
    Thought,
    Finish,
    ApprovalRequest,
    ApprovalResponse,
    /// Full assistant text replayed to a joining client
    HistoryContent,
}

/// The fundamental unit of communication between the relay and its clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl AgentEvent {
    /// Create an event with empty metadata
    pub fn new(event_type: EventType, content: impl Into<String>) -> Self {
        Self {
            event_type,
            content: content.into(),
            metadata: Map::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(EventType::System, content)
    }

    /// A human chat line, tagged with the sender when known
    pub fn user_input(content: impl Into<String>, user_id: Option<&str>) -> Self {
        let event = Self::new(EventType::UserInput, content);
        match user_id {
            Some(id) => event.with_metadata("user_id", id),
            None => event,
        }
    }

    pub fn token(content: impl Into<String>) -> Self {
        Self::new(EventType::Token, content)
    }

    pub fn thought(content: impl Into<String>) -> Self {
        Self::new(EventType::Thought, content)
    }

    pub fn tool_start(name: &str, input: Value) -> Self {
        Self::new(EventType::ToolStart, format!("Calling tool: {}", name))
            .with_metadata("name", name)
            .with_metadata("input", input)
    }

    pub fn tool_end(name: &str, output: impl Into<String>) -> Self {
        Self::new(EventType::ToolEnd, output).with_metadata("name", name)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventType::Error, message)
    }

    pub fn finish() -> Self {
        Self::new(EventType::Finish, "")
    }

    pub fn history_content(content: impl Into<String>) -> Self {
        Self::new(EventType::HistoryContent, content)
    }

    /// Approval prompt for a suspended tool call
    ///
    /// `args` is published under both `args` and `input` so older clients
    /// keep rendering the prompt.
    pub fn approval_request(request_id: &str, tool: &str, args: &Value) -> Self {
        Self::new(EventType::ApprovalRequest, format!("Allow {}?", tool))
            .with_metadata("tool", tool)
            .with_metadata("args", args.clone())
            .with_metadata("input", args.clone())
            .with_metadata("request_id", request_id)
    }

    /// Look up a string metadata value
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// Serialize to the wire format
    pub fn to_json(&self) -> RelayResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages a client may send over its connection
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Decision for an outstanding approval request
    ApprovalResponse {
        request_id: String,
        #[serde(default)]
        decision: ApprovalDecision,
    },

    /// Session command such as `/reset`
    Command { content: String },

    /// Chat line
    UserInput { content: String },
}

impl ClientMessage {
    /// Parse a raw text frame
    ///
    /// Plain text is a chat line. A JSON object with a `type` field must match
    /// one of the known shapes; otherwise it is dropped (`None`).
    pub fn parse(raw: &str) -> Option<ClientMessage> {
        let trimmed = raw.trim_start();
        if !trimmed.starts_with('{') {
            return Some(ClientMessage::UserInput {
                content: raw.to_string(),
            });
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(_) => {
                return Some(ClientMessage::UserInput {
                    content: raw.to_string(),
                })
            }
        };

        if value.get("type").is_none() {
            return Some(ClientMessage::UserInput {
                content: raw.to_string(),
            });
        }

        match serde_json::from_value(value) {
            Ok(msg) => Some(msg),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping malformed client message");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let event = AgentEvent::user_input("hello", Some("alice"));
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "user_input");
        assert_eq!(value["content"], "hello");
        assert_eq!(value["metadata"]["user_id"], "alice");
    }

    #[test]
    fn test_event_type_names() {
        let names: Vec<String> = [
            EventType::System,
            EventType::ToolStart,
            EventType::ApprovalRequest,
            EventType::HistoryContent,
        ]
        .iter()
        .map(|t| serde_json::to_value(t).unwrap().as_str().unwrap().to_string())
        .collect();

        assert_eq!(
            names,
            vec!["system", "tool_start", "approval_request", "history_content"]
        );
    }

    #[test]
    fn test_approval_request_metadata() {
        let event = AgentEvent::approval_request("req-1", "bash_execute", &json!({"command": "ls"}));

        assert_eq!(event.event_type, EventType::ApprovalRequest);
        assert_eq!(event.content, "Allow bash_execute?");
        assert_eq!(event.metadata_str("request_id"), Some("req-1"));
        assert_eq!(event.metadata_str("tool"), Some("bash_execute"));
        assert_eq!(event.metadata["args"]["command"], "ls");
    }

    #[test]
    fn test_parse_plain_text_is_chat() {
        assert_eq!(
            ClientMessage::parse("what time is it?"),
            Some(ClientMessage::UserInput {
                content: "what time is it?".into()
            })
        );
    }

    #[test]
    fn test_parse_approval_response() {
        let raw = r#"{"type":"approval_response","request_id":"abc","decision":"always_smart"}"#;
        assert_eq!(
            ClientMessage::parse(raw),
            Some(ClientMessage::ApprovalResponse {
                request_id: "abc".into(),
                decision: ApprovalDecision::AlwaysSmart,
            })
        );
    }

    #[test]
    fn test_parse_command() {
        let raw = r#"{"type":"command","content":"/reset"}"#;
        assert_eq!(
            ClientMessage::parse(raw),
            Some(ClientMessage::Command {
                content: "/reset".into()
            })
        );
    }

    #[test]
    fn test_parse_malformed_approval_is_dropped() {
        let raw = r#"{"type":"approval_response","decision":"allow"}"#;
        assert_eq!(ClientMessage::parse(raw), None);
    }

    #[test]
    fn test_parse_json_without_type_is_chat() {
        let raw = r#"{"some": "json"}"#;
        assert!(matches!(
            ClientMessage::parse(raw),
            Some(ClientMessage::UserInput { .. })
        ));
    }
}
