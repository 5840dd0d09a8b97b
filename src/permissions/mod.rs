//! Permission system for tool execution
//!
//! Every tool call the model makes passes through a per-session
//! [`Authorizer`] before it runs:
//! - **Allow-list**: signatures recorded by earlier "always…" decisions
//! - **Schema**: a fixed per-tool `allow` / `ask` / `deny` policy
//! - **Approval**: for `ask`, an `approval_request` event goes out and the
//!   call waits until a client answers
//!
//! ## Signatures
//!
//! - `exact`: `fs_write:{"path":"a.txt"}` (arguments canonicalized)
//! - `tool_wide`: `fs_write:*`
//! - `shell_command`: `bash:ls` (base executable of a simple shell command)
//!
//! ## Example
//!
//! ```rust,ignore
//! use shadow_relay::permissions::{Authorizer, PermissionSchema};
//! use std::sync::Arc;
//!
//! let auth = Authorizer::new(PermissionSchema::default(), emitter);
//! if auth.check("bash_execute", &json!({"command": "ls"})).await {
//!     // run it
//! }
//! // elsewhere, when the client answers:
//! auth.resolve(&request_id, ApprovalDecision::AlwaysSmart);
//! ```

mod authorizer;
mod pending;
mod schema;
pub mod signature;

pub use authorizer::Authorizer;
pub use pending::{ApprovalDecision, PendingApprovals, PendingGuard};
pub use schema::{PermissionPolicy, PermissionSchema};
pub use signature::SHELL_TOOL;
