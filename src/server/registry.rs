//! Session registry
//!
//! Tracks every live session and the clients attached to it:
//! - Creates engines lazily on first connection, rehydrating from the store
//! - Replays history to late joiners
//! - Broadcasts events to every connection of a session
//! - Runs at most one turn per session at a time
//! - Arms a debounced shutdown once the last client leaves

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::connection::{Connection, ConnectionId};
use crate::agent::{AgentEngine, EngineFactory};
use crate::config::DEFAULT_PROFILE;
use crate::core::{AgentEvent, ClientMessage, EventEmitter, RelayError, RelayResult};
use crate::permissions::ApprovalDecision;
use crate::session::{history, SessionStore};

/// Default delay between the last disconnect and shutdown
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

const RESET_COMMAND: &str = "/reset";

type ConnectionTable = RwLock<HashMap<String, Vec<Connection>>>;

/// Engine plus the lock serializing its turns
struct SessionState {
    engine: Arc<AgentEngine>,
    lock: Arc<Mutex<()>>,
    last_activity: StdMutex<DateTime<Utc>>,
}

impl SessionState {
    fn new(engine: Arc<AgentEngine>) -> Self {
        Self {
            engine,
            lock: Arc::new(Mutex::new(())),
            last_activity: StdMutex::new(Utc::now()),
        }
    }

    fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Utc::now();
    }

    fn last_activity(&self) -> DateTime<Utc> {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Send `event` to every connection of `session_id`
///
/// The envelope is serialized once. Sinks only queue, so a slow client
/// never holds up the others; dead ones are logged and skipped.
async fn broadcast_to(table: &ConnectionTable, session_id: &str, event: &AgentEvent) {
    let text = match event.to_json() {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(session_id, error = %e, "Cannot serialize event");
            return;
        }
    };

    let table = table.read().await;
    let Some(connections) = table.get(session_id) else {
        return;
    };

    for connection in connections {
        if let Err(e) = connection.send_text(text.clone()) {
            tracing::debug!(
                session_id,
                connection_id = %connection.id(),
                error = %e,
                "Dropping event for dead connection"
            );
        }
    }
}

/// Emitter publishing to all connections of one session
///
/// Handed to the session's authorizer so approval prompts reach every
/// viewer.
#[derive(Clone)]
pub struct SessionBroadcaster {
    session_id: String,
    connections: Arc<ConnectionTable>,
}

#[async_trait]
impl EventEmitter for SessionBroadcaster {
    async fn emit(&self, event: AgentEvent) {
        broadcast_to(&self.connections, &self.session_id, &event).await;
    }
}

/// Registry of sessions and their connections
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionState>>>,
    connections: Arc<ConnectionTable>,
    factory: Arc<dyn EngineFactory>,
    store: Arc<dyn SessionStore>,
    idle_timeout: Duration,
    idle_timer: StdMutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn EngineFactory>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            connections: Arc::new(RwLock::new(HashMap::new())),
            factory,
            store,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            idle_timer: StdMutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn factory(&self) -> &Arc<dyn EngineFactory> {
        &self.factory
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Cancelled when the idle timer expires
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether an idle shutdown is armed
    pub fn shutdown_pending(&self) -> bool {
        self.idle_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn broadcaster(&self, session_id: &str) -> SessionBroadcaster {
        SessionBroadcaster {
            session_id: session_id.to_string(),
            connections: self.connections.clone(),
        }
    }

    async fn session(&self, session_id: &str) -> RelayResult<Arc<SessionState>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| RelayError::SessionNotFound(session_id.to_string()))
    }

    /// Engine for `session_id`, if the session exists
    pub async fn engine(&self, session_id: &str) -> Option<Arc<AgentEngine>> {
        self.session(session_id).await.ok().map(|s| s.engine.clone())
    }

    /// Existing session, or a new one from the store or the factory
    async fn ensure_session(
        &self,
        session_id: &str,
        profile_name: &str,
    ) -> RelayResult<Arc<SessionState>> {
        if let Ok(state) = self.session(session_id).await {
            return Ok(state);
        }

        let emitter: Arc<dyn EventEmitter> = Arc::new(self.broadcaster(session_id));
        let engine = match self.store.load(session_id).await {
            Some(stored) => {
                tracing::info!(
                    session_id,
                    profile = %stored.profile,
                    records = stored.history.len(),
                    "[Registry] Rehydrating session"
                );
                let engine = self
                    .factory
                    .build(&stored.profile, emitter)
                    .await
                    .map_err(|e| RelayError::engine_init(format!("{:#}", e)))?;
                if !stored.history.is_empty() {
                    engine.replace_history(stored.history).await;
                }
                engine
            }
            None => {
                tracing::info!(session_id, profile = profile_name, "[Registry] New session");
                self.factory
                    .build(profile_name, emitter)
                    .await
                    .map_err(|e| RelayError::engine_init(format!("{:#}", e)))?
            }
        };

        // A concurrent connect may have won the race; keep the first engine.
        let mut sessions = self.sessions.write().await;
        let state = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(SessionState::new(engine)));
        Ok(state.clone())
    }

    /// Attach a connection to a session
    ///
    /// Returns `false` when the session's engine cannot be built; the
    /// connection is then told why and never joins the session.
    pub async fn connect(
        &self,
        connection: Connection,
        session_id: &str,
        profile_name: Option<&str>,
    ) -> bool {
        self.cancel_idle_timer();

        let profile_name = profile_name.unwrap_or(DEFAULT_PROFILE);
        let state = match self.ensure_session(session_id, profile_name).await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(session_id, error = %e, "[Registry] Engine initialization failed");
                if let Ok(text) = AgentEvent::error(e.to_string()).to_json() {
                    let _ = connection.send_text(text);
                }
                self.arm_idle_timer_if_empty().await;
                return false;
            }
        };
        state.touch();

        // Lock order is history, then connections. While both are held no
        // event can be recorded or broadcast, so the replay is exactly what
        // this connection missed and live events follow it.
        let replayed = {
            let records = state.engine.history_guard().await;
            let mut table = self.connections.write().await;
            let replay = history::replay(&records);

            for event in &replay {
                let text = match event.to_json() {
                    Ok(text) => text,
                    Err(_) => continue,
                };
                if connection.send_text(text).is_err() {
                    tracing::debug!(session_id, "Connection closed during replay");
                    break;
                }
            }

            table
                .entry(session_id.to_string())
                .or_default()
                .push(connection.clone());
            replay.len()
        };
        // A disconnect elsewhere may have armed the timer while the engine was built
        self.cancel_idle_timer();

        tracing::info!(
            session_id,
            connection_id = %connection.id(),
            replayed,
            "[Registry] Client connected"
        );
        true
    }

    /// Returns true when no connection is left anywhere
    async fn remove_connection(&self, connection_id: ConnectionId, session_id: &str) -> bool {
        let mut table = self.connections.write().await;
        if let Some(connections) = table.get_mut(session_id) {
            connections.retain(|c| c.id() != connection_id);
            if connections.is_empty() {
                table.remove(session_id);
            }
        }
        table.is_empty()
    }

    /// Detach a connection
    ///
    /// The session's engine survives; in-flight turns keep running.
    pub async fn disconnect(&self, connection_id: ConnectionId, session_id: &str) {
        let idle = self.remove_connection(connection_id, session_id).await;
        tracing::info!(session_id, connection_id = %connection_id, "[Registry] Client disconnected");

        if idle {
            self.arm_idle_timer();
        }
    }

    async fn arm_idle_timer_if_empty(&self) {
        if self.connections.read().await.is_empty() {
            self.arm_idle_timer();
        }
    }

    fn arm_idle_timer(&self) {
        let connections = self.connections.clone();
        let shutdown = self.shutdown.clone();
        let timeout = self.idle_timeout;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if connections.read().await.is_empty() {
                tracing::info!(
                    timeout_secs = timeout.as_secs(),
                    "[Registry] No clients left, shutting down"
                );
                shutdown.cancel();
            }
        });

        let previous = self
            .idle_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        tracing::debug!(timeout_secs = timeout.as_secs(), "[Registry] Idle timer armed");
    }

    fn cancel_idle_timer(&self) {
        let handle = self
            .idle_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            tracing::debug!("[Registry] Idle timer cancelled");
        }
    }

    /// Send `event` to every connection of a session
    pub async fn broadcast(&self, session_id: &str, event: &AgentEvent) {
        broadcast_to(&self.connections, session_id, event).await;
    }

    async fn persist(&self, session_id: &str, engine: &AgentEngine) {
        let records = engine.history().await;
        self.store
            .save(session_id, engine.profile_name(), &records)
            .await;
    }

    /// Start a turn
    ///
    /// The user's line is broadcast right away; the turn itself runs in a
    /// spawned task once the session lock is free. History is saved after
    /// the turn whether it succeeded or not.
    pub async fn submit_chat(
        self: &Arc<Self>,
        session_id: &str,
        text: String,
        user_id: Option<String>,
    ) -> RelayResult<JoinHandle<()>> {
        let state = self.session(session_id).await?;
        state.touch();

        self.broadcast(session_id, &AgentEvent::user_input(text.clone(), user_id.as_deref()))
            .await;

        let registry = Arc::clone(self);
        let session_id = session_id.to_string();

        Ok(tokio::spawn(async move {
            let _turn = state.lock.lock().await;
            tracing::debug!(session_id = %session_id, "[Registry] Turn started");

            let mut events = state.engine.stream(text, user_id);
            while let Some(item) = events.next().await {
                match item {
                    Ok(event) => registry.broadcast(&session_id, &event).await,
                    Err(e) => {
                        tracing::error!(session_id = %session_id, error = %e, "[Registry] Turn failed");
                        registry
                            .broadcast(&session_id, &AgentEvent::error(e.to_string()))
                            .await;
                        break;
                    }
                }
            }

            registry.persist(&session_id, &state.engine).await;
            state.touch();
            tracing::debug!(session_id = %session_id, "[Registry] Turn finished");
        }))
    }

    /// Route an approval decision to the session's authorizer
    ///
    /// Does not take the session lock; the turn holding it is the one
    /// waiting for this decision.
    pub async fn resolve_approval(
        &self,
        session_id: &str,
        request_id: &str,
        decision: ApprovalDecision,
    ) -> bool {
        let state = match self.session(session_id).await {
            Ok(state) => state,
            Err(_) => return false,
        };
        state.touch();
        state.engine.authorizer().resolve(request_id, decision)
    }

    /// Run a session command
    ///
    /// `/reset` denies pending approvals right away and then runs in its own
    /// task, which waits for any turn in flight to end before clearing the
    /// history. The caller never blocks on the session lock, so it can keep
    /// routing approval responses to that turn.
    pub async fn execute_command(
        self: &Arc<Self>,
        session_id: &str,
        command: &str,
    ) -> RelayResult<Option<JoinHandle<()>>> {
        let state = self.session(session_id).await?;
        state.touch();

        match command.trim() {
            RESET_COMMAND => {
                let denied = state.engine.authorizer().cancel_all();
                let registry = Arc::clone(self);
                let session_id = session_id.to_string();

                Ok(Some(tokio::spawn(async move {
                    let _turn = state.lock.lock().await;
                    let removed = state.engine.reset().await;
                    registry.persist(&session_id, &state.engine).await;

                    tracing::info!(
                        session_id = %session_id,
                        removed,
                        denied,
                        "[Registry] History reset"
                    );
                    registry
                        .broadcast(&session_id, &AgentEvent::system("History cleared."))
                        .await;
                })))
            }
            other => {
                tracing::debug!(session_id, command = other, "[Registry] Unknown command");
                let err = RelayError::UnknownCommand(other.to_string());
                self.broadcast(session_id, &AgentEvent::error(err.to_string()))
                    .await;
                Ok(None)
            }
        }
    }

    /// Dispatch one raw text frame from a client
    ///
    /// Never waits on the session lock. Returns the spawned task's handle
    /// when the frame started a turn or a reset.
    pub async fn handle_client_message(
        self: &Arc<Self>,
        session_id: &str,
        connection_id: ConnectionId,
        user_id: Option<&str>,
        raw: &str,
    ) -> RelayResult<Option<JoinHandle<()>>> {
        let message = match ClientMessage::parse(raw) {
            Some(message) => message,
            None => {
                tracing::debug!(session_id, connection_id = %connection_id, "Ignoring malformed frame");
                return Ok(None);
            }
        };

        match message {
            ClientMessage::ApprovalResponse {
                request_id,
                decision,
            } => {
                let resolved = self.resolve_approval(session_id, &request_id, decision).await;
                tracing::debug!(session_id, request_id = %request_id, resolved, "Approval response");
                Ok(None)
            }
            ClientMessage::Command { content } => self.execute_command(session_id, &content).await,
            ClientMessage::UserInput { content } => {
                let handle = self
                    .submit_chat(session_id, content, user_id.map(str::to_string))
                    .await?;
                Ok(Some(handle))
            }
        }
    }

    /// Ids of sessions with a live engine, sorted
    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn has_session(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn connection_count(&self, session_id: &str) -> usize {
        self.connections
            .read()
            .await
            .get(session_id)
            .map_or(0, Vec::len)
    }

    pub async fn last_activity(&self, session_id: &str) -> Option<DateTime<Utc>> {
        self.session(session_id)
            .await
            .ok()
            .map(|state| state.last_activity())
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("idle_timeout", &self.idle_timeout)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}
