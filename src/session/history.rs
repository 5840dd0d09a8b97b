//! Conversation history records
//!
//! A session's history is an ordered `Vec<TurnRecord>`. The first record is
//! normally the system prompt; everything after it is what a joining client
//! gets replayed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentEvent;

/// One entry in a session's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum TurnRecord {
    /// System prompt
    System { content: String },

    /// Human chat line
    User {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },

    /// Assistant reply text
    Assistant { content: String },

    /// Completed tool call
    Tool {
        name: String,
        #[serde(default)]
        input: Value,
        #[serde(default)]
        output: String,
    },
}

impl TurnRecord {
    pub fn system(content: impl Into<String>) -> Self {
        TurnRecord::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>, user_id: Option<String>) -> Self {
        TurnRecord::User {
            content: content.into(),
            user_id,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        TurnRecord::Assistant {
            content: content.into(),
        }
    }

    pub fn tool(name: impl Into<String>, input: Value, output: impl Into<String>) -> Self {
        TurnRecord::Tool {
            name: name.into(),
            input,
            output: output.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, TurnRecord::System { .. })
    }

    /// Events that reproduce this record for a late-joining client
    ///
    /// Assistant text is sent whole as `history_content`, never as tokens.
    pub fn replay_events(&self) -> Vec<AgentEvent> {
        match self {
            TurnRecord::System { .. } => Vec::new(),
            TurnRecord::User { content, user_id } => {
                vec![AgentEvent::user_input(content.clone(), user_id.as_deref())]
            }
            TurnRecord::Assistant { content } => vec![
                AgentEvent::history_content(content.clone()),
                AgentEvent::finish(),
            ],
            TurnRecord::Tool {
                name,
                input,
                output,
            } => vec![
                AgentEvent::tool_start(name, input.clone()),
                AgentEvent::tool_end(name, output.clone()),
                AgentEvent::finish(),
            ],
        }
    }
}

/// Replay a whole history, in order
pub fn replay(history: &[TurnRecord]) -> Vec<AgentEvent> {
    history.iter().flat_map(TurnRecord::replay_events).collect()
}

/// Drop everything except a leading system record
pub fn truncate_to_system(history: &mut Vec<TurnRecord>) {
    let keep = usize::from(history.first().is_some_and(TurnRecord::is_system));
    history.truncate(keep);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventType;
    use serde_json::json;

    fn sample_history() -> Vec<TurnRecord> {
        vec![
            TurnRecord::system("You are helpful."),
            TurnRecord::user("list files", Some("alice".into())),
            TurnRecord::tool("bash_execute", json!({"command": "ls"}), "a.txt\nb.txt"),
            TurnRecord::assistant("There are two files."),
        ]
    }

    #[test]
    fn test_replay_order_and_types() {
        let events = replay(&sample_history());
        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();

        assert_eq!(
            types,
            vec![
                EventType::UserInput,
                EventType::ToolStart,
                EventType::ToolEnd,
                EventType::Finish,
                EventType::HistoryContent,
                EventType::Finish,
            ]
        );
        assert_eq!(events[0].metadata_str("user_id"), Some("alice"));
        assert_eq!(events[1].metadata["input"]["command"], "ls");
        assert_eq!(events[2].content, "a.txt\nb.txt");
        assert_eq!(events[2].metadata_str("name"), Some("bash_execute"));
        assert_eq!(events[4].content, "There are two files.");
    }

    #[test]
    fn test_replay_never_emits_tokens_or_system() {
        let events = replay(&sample_history());
        assert!(events
            .iter()
            .all(|e| e.event_type != EventType::Token && e.event_type != EventType::System));
    }

    #[test]
    fn test_user_without_id_has_no_metadata() {
        let events = TurnRecord::user("hi", None).replay_events();
        assert!(events[0].metadata.is_empty());
    }

    #[test]
    fn test_truncate_to_system() {
        let mut history = sample_history();
        truncate_to_system(&mut history);
        assert_eq!(history, vec![TurnRecord::system("You are helpful.")]);

        let mut no_system = vec![TurnRecord::user("hi", None)];
        truncate_to_system(&mut no_system);
        assert!(no_system.is_empty());
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(TurnRecord::user("hi", None)).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "hi"}));

        let record: TurnRecord =
            serde_json::from_value(json!({"role": "tool", "name": "fs_read"})).unwrap();
        assert_eq!(record, TurnRecord::tool("fs_read", Value::Null, ""));
    }
}
