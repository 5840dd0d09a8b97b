//! Session history and persistence
//!
//! This module provides the `TurnRecord` history model (with the replay
//! rules used for late-joining clients) and the `SessionStore` trait with
//! its JSON-file implementation.

pub mod history;
pub mod store;

pub use history::TurnRecord;
pub use store::{JsonSessionStore, SessionStore, StoredSession};
