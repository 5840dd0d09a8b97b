//! Outstanding approval requests
//!
//! A table of suspended callers keyed by request id. The caller registers,
//! publishes the id, then awaits its receiver; whoever receives the user's
//! decision resolves the id from any task.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

/// The user's answer to an approval request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Refuse this call
    #[default]
    Deny,
    /// Run this call once
    Allow,
    /// Always run this tool, any arguments
    AlwaysTool,
    /// Always run this tool with exactly these arguments
    AlwaysExact,
    /// Always run this base shell command (exact call for other tools)
    AlwaysSmart,
    /// Anything else a client sent; treated as a refusal
    #[serde(other)]
    Unrecognized,
}

impl ApprovalDecision {
    /// Whether the call goes ahead
    pub fn is_allowed(&self) -> bool {
        !matches!(self, ApprovalDecision::Deny | ApprovalDecision::Unrecognized)
    }
}

/// Pending approval table
#[derive(Debug, Default)]
pub struct PendingApprovals {
    waiters: Mutex<HashMap<Uuid, oneshot::Sender<ApprovalDecision>>>,
}

impl PendingApprovals {
    pub fn new() -> Self {
        Self::default()
    }

    fn waiters(&self) -> MutexGuard<'_, HashMap<Uuid, oneshot::Sender<ApprovalDecision>>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new request and get the receiver to await
    pub fn register(&self) -> (Uuid, oneshot::Receiver<ApprovalDecision>) {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.waiters().insert(id, tx);
        (id, rx)
    }

    /// Guard that drops the entry for `id` when the waiter goes away
    pub fn guard(&self, id: Uuid) -> PendingGuard<'_> {
        PendingGuard { pending: self, id }
    }

    /// Complete a pending request
    ///
    /// Returns `false` for unknown, already resolved, or abandoned ids.
    pub fn resolve(&self, id: &Uuid, decision: ApprovalDecision) -> bool {
        let waiter = self.waiters().remove(id);
        match waiter {
            Some(tx) => tx.send(decision).is_ok(),
            None => false,
        }
    }

    /// Remove an entry without completing it
    pub fn remove(&self, id: &Uuid) -> bool {
        self.waiters().remove(id).is_some()
    }

    /// Deny every outstanding request, returning how many were waiting
    pub fn deny_all(&self) -> usize {
        let drained: Vec<_> = self.waiters().drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(ApprovalDecision::Deny);
        }
        count
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.waiters().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.waiters().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters().is_empty()
    }
}

/// Removes a pending entry when the waiting side finishes, however it finishes
pub struct PendingGuard<'a> {
    pending: &'a PendingApprovals,
    id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}
