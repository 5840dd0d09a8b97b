//! Tool-call authorizer
//!
//! One `Authorizer` per session. It answers a single question for the tool
//! layer: may this call run? The answer comes from, in order:
//! - the session allow-list (filled by "always…" decisions)
//! - the permission schema (ALLOW / DENY answer immediately)
//! - a human, via an `approval_request` event and a later `resolve`

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use super::pending::{ApprovalDecision, PendingApprovals};
use super::schema::{PermissionPolicy, PermissionSchema};
use super::signature::{self, SHELL_TOOL};
use crate::core::{AgentEvent, EventEmitter};

/// Policy engine for one session
pub struct Authorizer {
    schema: PermissionSchema,
    allowlist: RwLock<HashSet<String>>,
    pending: PendingApprovals,
    emitter: Arc<dyn EventEmitter>,
    approval_timeout: Option<Duration>,
}

impl Authorizer {
    /// Create an authorizer publishing approval prompts through `emitter`
    pub fn new(schema: PermissionSchema, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            schema,
            allowlist: RwLock::new(HashSet::new()),
            pending: PendingApprovals::new(),
            emitter,
            approval_timeout: None,
        }
    }

    /// Auto-deny approval requests left unanswered for `timeout`
    pub fn with_approval_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.approval_timeout = timeout;
        self
    }

    pub fn schema(&self) -> &PermissionSchema {
        &self.schema
    }

    /// Decide whether a tool call may run
    ///
    /// May suspend indefinitely (or until the approval timeout) while a
    /// human is asked. Never errors.
    pub async fn check(&self, tool: &str, args: &Value) -> bool {
        if self.is_allowlisted(tool, args) {
            tracing::debug!(tool = %tool, "Allowed by session allow-list");
            return true;
        }

        match self.schema.policy_for(tool) {
            PermissionPolicy::Allow => true,
            PermissionPolicy::Deny => {
                tracing::info!(tool = %tool, schema = %self.schema.name, "Denied by policy");
                false
            }
            PermissionPolicy::Ask => self.request_approval(tool, args).await,
        }
    }

    /// Whether a prior "always…" decision covers this call
    pub fn is_allowlisted(&self, tool: &str, args: &Value) -> bool {
        let allowlist = self.allowlist.read().unwrap_or_else(PoisonError::into_inner);

        if allowlist.contains(&signature::exact(tool, args))
            || allowlist.contains(&signature::tool_wide(tool, args))
        {
            return true;
        }

        if tool == SHELL_TOOL {
            if let Some(sig) = signature::shell_command(tool, args) {
                return allowlist.contains(&sig);
            }
        }

        false
    }

    /// Ask the session's clients and wait for their decision
    pub async fn request_approval(&self, tool: &str, args: &Value) -> bool {
        let (request_id, rx) = self.pending.register();
        let _guard = self.pending.guard(request_id);

        tracing::info!(request_id = %request_id, tool = %tool, "Requesting approval");
        self.emitter
            .emit(AgentEvent::approval_request(
                &request_id.to_string(),
                tool,
                args,
            ))
            .await;

        let decision = match self.approval_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received.unwrap_or_default(),
                Err(_) => {
                    tracing::warn!(
                        request_id = %request_id,
                        tool = %tool,
                        timeout_secs = limit.as_secs_f64(),
                        "Approval timed out, denying"
                    );
                    ApprovalDecision::Deny
                }
            },
            None => rx.await.unwrap_or_default(),
        };

        tracing::info!(request_id = %request_id, tool = %tool, decision = ?decision, "Approval resolved");
        self.apply_decision(tool, args, decision)
    }

    fn apply_decision(&self, tool: &str, args: &Value, decision: ApprovalDecision) -> bool {
        let entry = match decision {
            ApprovalDecision::Deny | ApprovalDecision::Unrecognized => return false,
            ApprovalDecision::Allow => return true,
            ApprovalDecision::AlwaysTool => signature::tool_wide(tool, args),
            ApprovalDecision::AlwaysExact => signature::exact(tool, args),
            ApprovalDecision::AlwaysSmart => {
                let smart = if tool == SHELL_TOOL {
                    signature::shell_command(tool, args)
                } else {
                    None
                };
                smart.unwrap_or_else(|| signature::exact(tool, args))
            }
        };

        tracing::info!(tool = %tool, signature = %entry, "Adding allow-list entry");
        self.allowlist
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry);
        true
    }

    /// Deliver a decision for an outstanding request
    ///
    /// Unknown, malformed, or already-consumed ids are ignored.
    pub fn resolve(&self, request_id: &str, decision: ApprovalDecision) -> bool {
        let resolved = match Uuid::parse_str(request_id) {
            Ok(id) => self.pending.resolve(&id, decision),
            Err(_) => false,
        };
        if !resolved {
            tracing::debug!(request_id = %request_id, "Ignoring stale approval response");
        }
        resolved
    }

    /// Deny every outstanding request
    pub fn cancel_all(&self) -> usize {
        let count = self.pending.deny_all();
        if count > 0 {
            tracing::info!(count, "Cancelled pending approvals");
        }
        count
    }

    /// Snapshot of the allow-list, sorted
    pub fn allowlist(&self) -> Vec<String> {
        let mut entries: Vec<String> = self
            .allowlist
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        entries.sort();
        entries
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("schema", &self.schema.name)
            .field("allowlist", &self.allowlist())
            .field("pending", &self.pending.len())
            .field("approval_timeout", &self.approval_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventType;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn create_test_authorizer(
        schema: PermissionSchema,
    ) -> (Arc<Authorizer>, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Authorizer::new(schema, Arc::new(tx))), rx)
    }

    fn ask_everything() -> PermissionSchema {
        PermissionSchema::new("test", PermissionPolicy::Ask)
    }

    /// Spawn a check and return the request id it publishes
    async fn spawn_check(
        auth: &Arc<Authorizer>,
        rx: &mut mpsc::UnboundedReceiver<AgentEvent>,
        tool: &str,
        args: Value,
    ) -> (tokio::task::JoinHandle<bool>, String) {
        let auth = auth.clone();
        let tool_name = tool.to_string();
        let handle = tokio::spawn(async move { auth.check(&tool_name, &args).await });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::ApprovalRequest);
        let id = event.metadata_str("request_id").unwrap().to_string();
        (handle, id)
    }

    #[tokio::test]
    async fn test_allow_and_deny_policies_emit_nothing() {
        let schema = PermissionSchema::new("test", PermissionPolicy::Ask)
            .with_tool("fs_read", PermissionPolicy::Allow)
            .with_tool("bash_execute", PermissionPolicy::Deny);
        let (auth, mut rx) = create_test_authorizer(schema);

        assert!(auth.check("fs_read", &json!({"path": "a"})).await);
        assert!(!auth.check("bash_execute", &json!({"command": "ls"})).await);
        assert!(rx.try_recv().is_err());
        assert_eq!(auth.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_approval_round_trip() {
        let (auth, mut rx) = create_test_authorizer(ask_everything());

        let (handle, id) = spawn_check(&auth, &mut rx, "fs_write", json!({"path": "x"})).await;
        assert_eq!(auth.pending_count(), 1);

        assert!(auth.resolve(&id, ApprovalDecision::Allow));
        assert!(handle.await.unwrap());
        assert_eq!(auth.pending_count(), 0);
        assert!(auth.allowlist().is_empty());
    }

    #[tokio::test]
    async fn test_deny_and_unknown_decisions_refuse() {
        let (auth, mut rx) = create_test_authorizer(ask_everything());

        let (handle, id) = spawn_check(&auth, &mut rx, "fs_write", json!({})).await;
        auth.resolve(&id, ApprovalDecision::Deny);
        assert!(!handle.await.unwrap());

        let (handle, id) = spawn_check(&auth, &mut rx, "fs_write", json!({})).await;
        auth.resolve(&id, ApprovalDecision::Unrecognized);
        assert!(!handle.await.unwrap());
        assert!(auth.allowlist().is_empty());
    }

    #[tokio::test]
    async fn test_always_smart_shell_scenario() {
        let (auth, mut rx) = create_test_authorizer(ask_everything());

        let (handle, id) =
            spawn_check(&auth, &mut rx, "bash_execute", json!({"command": "ls -la"})).await;
        auth.resolve(&id, ApprovalDecision::AlwaysSmart);
        assert!(handle.await.unwrap());
        assert_eq!(auth.allowlist(), vec!["bash:ls".to_string()]);

        // Same base command, different flags: no prompt
        assert!(auth.check("bash_execute", &json!({"command": "ls /tmp"})).await);
        assert!(rx.try_recv().is_err());

        // Chained command cannot be generalized: prompt again
        let (handle, id) = spawn_check(
            &auth,
            &mut rx,
            "bash_execute",
            json!({"command": "ls && rm -rf /"}),
        )
        .await;
        auth.resolve(&id, ApprovalDecision::Deny);
        assert!(!handle.await.unwrap());

        // Stale id is a no-op
        assert!(!auth.resolve(&id, ApprovalDecision::Allow));
    }

    #[tokio::test]
    async fn test_always_smart_falls_back_to_exact() {
        let (auth, mut rx) = create_test_authorizer(ask_everything());
        let args = json!({"command": "ls | wc -l"});

        let (handle, id) = spawn_check(&auth, &mut rx, "bash_execute", args.clone()).await;
        auth.resolve(&id, ApprovalDecision::AlwaysSmart);
        assert!(handle.await.unwrap());

        assert_eq!(auth.allowlist(), vec![signature::exact("bash_execute", &args)]);
        assert!(auth.check("bash_execute", &args).await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_always_tool_covers_any_arguments() {
        let (auth, mut rx) = create_test_authorizer(ask_everything());

        let (handle, id) = spawn_check(&auth, &mut rx, "fs_write", json!({"path": "a"})).await;
        auth.resolve(&id, ApprovalDecision::AlwaysTool);
        assert!(handle.await.unwrap());

        assert!(auth.check("fs_write", &json!({"path": "b", "append": true})).await);
        assert!(rx.try_recv().is_err());
        assert_eq!(auth.allowlist(), vec!["fs_write:*".to_string()]);
    }

    #[tokio::test]
    async fn test_always_exact_ignores_key_order() {
        let (auth, mut rx) = create_test_authorizer(ask_everything());

        let (handle, id) = spawn_check(
            &auth,
            &mut rx,
            "fs_write",
            json!({"path": "a", "content": "x"}),
        )
        .await;
        auth.resolve(&id, ApprovalDecision::AlwaysExact);
        assert!(handle.await.unwrap());

        assert!(auth.check("fs_write", &json!({"content": "x", "path": "a"})).await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_allowlist_overrides_deny_policy() {
        let schema = PermissionSchema::new("test", PermissionPolicy::Deny);
        let (auth, _rx) = create_test_authorizer(schema);
        auth.apply_decision("fs_write", &json!({}), ApprovalDecision::AlwaysTool);

        assert!(auth.check("fs_write", &json!({"path": "z"})).await);
    }

    #[tokio::test]
    async fn test_malformed_request_id_is_noop() {
        let (auth, _rx) = create_test_authorizer(ask_everything());
        assert!(!auth.resolve("not-a-uuid", ApprovalDecision::Allow));
        assert!(!auth.resolve(&Uuid::new_v4().to_string(), ApprovalDecision::Allow));
    }

    #[tokio::test]
    async fn test_approval_timeout_denies() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let auth = Arc::new(
            Authorizer::new(ask_everything(), Arc::new(tx))
                .with_approval_timeout(Some(Duration::from_millis(50))),
        );

        let (handle, id) = spawn_check(&auth, &mut rx, "fs_write", json!({})).await;
        assert!(!handle.await.unwrap());
        assert_eq!(auth.pending_count(), 0);
        assert!(!auth.resolve(&id, ApprovalDecision::Allow));
    }

    #[tokio::test]
    async fn test_cancel_all_denies_waiters() {
        let (auth, mut rx) = create_test_authorizer(ask_everything());

        let (first, _) = spawn_check(&auth, &mut rx, "fs_write", json!({"n": 1})).await;
        let (second, _) = spawn_check(&auth, &mut rx, "fs_write", json!({"n": 2})).await;
        assert_eq!(auth.pending_count(), 2);

        assert_eq!(auth.cancel_all(), 2);
        assert!(!first.await.unwrap());
        assert!(!second.await.unwrap());
        assert_eq!(auth.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_check_cleans_up() {
        let (auth, mut rx) = create_test_authorizer(ask_everything());

        let (handle, id) = spawn_check(&auth, &mut rx, "fs_write", json!({})).await;
        handle.abort();
        let _ = handle.await;

        assert_eq!(auth.pending_count(), 0);
        assert!(!auth.resolve(&id, ApprovalDecision::Allow));
    }
}
