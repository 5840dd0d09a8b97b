//! Per-session agent engine
//!
//! Owns the session's history, its authorizer and its guarded tools, and
//! runs turns through an [`AgentLoop`]. The engine does not serialize turns;
//! callers hold the session lock around [`AgentEngine::stream`] and
//! [`AgentEngine::reset`].
//!
//! Events that are also recorded (`tool_end`, `finish`) are yielded with the
//! history write lock still held. It is released when the consumer polls
//! again, so anyone snapshotting through [`AgentEngine::history_guard`]
//! sees a record only once its event has been handed out.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{RwLock, RwLockReadGuard};

use super::agent_loop::{AgentLoop, EventStream, TurnRequest};
use crate::config::Profile;
use crate::core::{AgentEvent, EventType};
use crate::permissions::Authorizer;
use crate::session::history::{self, TurnRecord};
use crate::tools::ToolRegistry;

/// Agent state for one session
pub struct AgentEngine {
    profile: Profile,
    history: RwLock<Vec<TurnRecord>>,
    authorizer: Arc<Authorizer>,
    tools: Arc<ToolRegistry>,
    agent_loop: Arc<dyn AgentLoop>,
}

impl AgentEngine {
    /// Build an engine whose tools all go through `authorizer`
    pub fn new(
        profile: Profile,
        system_prompt: impl Into<String>,
        authorizer: Arc<Authorizer>,
        base_tools: &ToolRegistry,
        agent_loop: Arc<dyn AgentLoop>,
    ) -> Self {
        let tools = Arc::new(base_tools.guarded(&authorizer));
        Self {
            profile,
            history: RwLock::new(vec![TurnRecord::system(system_prompt)]),
            authorizer,
            tools,
            agent_loop,
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn profile_name(&self) -> &str {
        &self.profile.name
    }

    pub fn authorizer(&self) -> &Arc<Authorizer> {
        &self.authorizer
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Snapshot of the history
    pub async fn history(&self) -> Vec<TurnRecord> {
        self.history.read().await.clone()
    }

    /// Hold the history for reading; recording waits until it is dropped
    pub async fn history_guard(&self) -> RwLockReadGuard<'_, Vec<TurnRecord>> {
        self.history.read().await
    }

    /// Replace the history wholesale (rehydration)
    pub async fn replace_history(&self, records: Vec<TurnRecord>) {
        *self.history.write().await = records;
    }

    /// Drop everything but the system record, returning how many records went
    pub async fn reset(&self) -> usize {
        let mut records = self.history.write().await;
        let before = records.len();
        history::truncate_to_system(&mut records);
        before - records.len()
    }

    fn system_prompt(records: &[TurnRecord]) -> String {
        match records.first() {
            Some(TurnRecord::System { content }) => content.clone(),
            _ => String::new(),
        }
    }

    /// Run one turn
    ///
    /// The user message, tool calls and assistant text are appended to the
    /// history as the stream is consumed. A successful turn ends with
    /// `finish`; a failed one ends with the error, keeping whatever partial
    /// text was produced.
    pub fn stream(self: &Arc<Self>, input: String, user_id: Option<String>) -> EventStream {
        let engine = Arc::clone(self);

        Box::pin(async_stream::try_stream! {
            let request = {
                let mut records = engine.history.write().await;
                let request = TurnRequest {
                    system_prompt: Self::system_prompt(&records),
                    history: records.clone(),
                    input: input.clone(),
                    tools: engine.tools.clone(),
                };
                records.push(TurnRecord::user(input, user_id));
                request
            };

            tracing::debug!(
                profile = %engine.profile.name,
                agent_loop = engine.agent_loop.name(),
                "Starting turn"
            );

            let mut events = engine.agent_loop.run_turn(request);
            let mut text = String::new();
            let mut open_tool: Option<(String, serde_json::Value)> = None;

            while let Some(item) = events.next().await {
                let event = match item {
                    Ok(event) => event,
                    Err(e) => {
                        engine.flush_text(&mut text).await;
                        Err::<AgentEvent, anyhow::Error>(e)?
                    }
                };

                match event.event_type {
                    EventType::Token => text.push_str(&event.content),
                    EventType::ToolStart => {
                        engine.flush_text(&mut text).await;
                        let name = event.metadata_str("name").unwrap_or_default().to_string();
                        let input = event.metadata.get("input").cloned().unwrap_or_default();
                        open_tool = Some((name, input));
                    }
                    EventType::ToolEnd => {
                        let (name, input) = open_tool.take().unwrap_or_else(|| {
                            let name = event.metadata_str("name").unwrap_or_default().to_string();
                            (name, serde_json::Value::Null)
                        });
                        let mut records = engine.history.write().await;
                        records.push(TurnRecord::tool(name, input, event.content.clone()));
                        yield event;
                        drop(records);
                        continue;
                    }
                    _ => {}
                }

                yield event;
            }

            let mut records = engine.history.write().await;
            if !text.is_empty() {
                records.push(TurnRecord::assistant(std::mem::take(&mut text)));
            }
            yield AgentEvent::finish();
            drop(records);
        })
    }

    async fn flush_text(&self, text: &mut String) {
        if !text.is_empty() {
            self.history
                .write()
                .await
                .push(TurnRecord::assistant(std::mem::take(text)));
        }
    }
}

impl std::fmt::Debug for AgentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentEngine")
            .field("profile", &self.profile.name)
            .field("agent_loop", &self.agent_loop.name())
            .field("tools", &self.tools.tool_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NullEmitter;
    use crate::permissions::PermissionSchema;
    use serde_json::json;
    use std::time::Duration;

    /// Replays a fixed list of events, optionally failing at the end
    struct ScriptedLoop {
        events: Vec<AgentEvent>,
        fail: bool,
    }

    impl AgentLoop for ScriptedLoop {
        fn name(&self) -> &str {
            "scripted"
        }

        fn run_turn(&self, _request: TurnRequest) -> EventStream {
            let events = self.events.clone();
            let fail = self.fail;
            Box::pin(async_stream::try_stream! {
                for event in events {
                    yield event;
                }
                if fail {
                    Err::<(), _>(anyhow::anyhow!("model unavailable"))?;
                }
            })
        }
    }

    fn create_test_engine(events: Vec<AgentEvent>, fail: bool) -> Arc<AgentEngine> {
        let authorizer = Arc::new(Authorizer::new(
            PermissionSchema::default(),
            Arc::new(NullEmitter),
        ));
        Arc::new(AgentEngine::new(
            Profile::new("default"),
            "system prompt",
            authorizer,
            &ToolRegistry::new(),
            Arc::new(ScriptedLoop { events, fail }),
        ))
    }

    async fn collect(stream: EventStream) -> (Vec<AgentEvent>, Option<String>) {
        let mut events = Vec::new();
        let mut stream = stream;
        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => events.push(event),
                Err(e) => return (events, Some(e.to_string())),
            }
        }
        (events, None)
    }

    #[tokio::test]
    async fn test_turn_records_history() {
        let engine = create_test_engine(
            vec![
                AgentEvent::token("Let me "),
                AgentEvent::token("check."),
                AgentEvent::tool_start("bash_execute", json!({"command": "ls"})),
                AgentEvent::tool_end("bash_execute", "a.txt"),
                AgentEvent::token("One file."),
            ],
            false,
        );

        let (events, err) = collect(engine.stream("what's here?".into(), Some("bob".into()))).await;
        assert!(err.is_none());
        assert_eq!(events.last().unwrap().event_type, EventType::Finish);

        assert_eq!(
            engine.history().await,
            vec![
                TurnRecord::system("system prompt"),
                TurnRecord::user("what's here?", Some("bob".into())),
                TurnRecord::assistant("Let me check."),
                TurnRecord::tool("bash_execute", json!({"command": "ls"}), "a.txt"),
                TurnRecord::assistant("One file."),
            ]
        );
    }

    #[tokio::test]
    async fn test_recorded_event_holds_history_until_delivered() {
        let engine = create_test_engine(
            vec![
                AgentEvent::tool_start("bash_execute", json!({"command": "ls"})),
                AgentEvent::tool_end("bash_execute", "a.txt"),
                AgentEvent::token("done"),
            ],
            false,
        );
        let mut stream = engine.stream("go".into(), None);

        stream.next().await.unwrap().unwrap();
        let end = stream.next().await.unwrap().unwrap();
        assert_eq!(end.event_type, EventType::ToolEnd);

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), engine.history_guard()).await;
        assert!(blocked.is_err());

        let token = stream.next().await.unwrap().unwrap();
        assert_eq!(token.event_type, EventType::Token);
        assert_eq!(engine.history_guard().await.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_partial_text() {
        let engine = create_test_engine(vec![AgentEvent::token("partial")], true);

        let (events, err) = collect(engine.stream("hi".into(), None)).await;
        assert_eq!(err.as_deref(), Some("model unavailable"));
        assert!(events.iter().all(|e| e.event_type != EventType::Finish));

        let history = engine.history().await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[2], TurnRecord::assistant("partial"));
    }

    #[tokio::test]
    async fn test_reset_keeps_system() {
        let engine = create_test_engine(vec![AgentEvent::token("ok")], false);
        collect(engine.stream("one".into(), None)).await;
        collect(engine.stream("two".into(), None)).await;

        assert_eq!(engine.history().await.len(), 5);
        assert_eq!(engine.reset().await, 4);
        assert_eq!(engine.history().await, vec![TurnRecord::system("system prompt")]);
    }

    #[tokio::test]
    async fn test_replace_history() {
        let engine = create_test_engine(Vec::new(), false);
        let restored = vec![
            TurnRecord::system("old prompt"),
            TurnRecord::user("earlier", None),
        ];
        engine.replace_history(restored.clone()).await;
        assert_eq!(engine.history().await, restored);
    }
}
