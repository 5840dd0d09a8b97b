//! Multi-client server
//!
//! This module provides:
//! - `SessionRegistry` - Sessions, their connections, turns and broadcast
//! - `Connection` / `EventSink` - Outbound side of one client
//! - `router` - axum routes (WebSocket chat plus a small JSON API)

pub mod connection;
pub mod registry;
pub mod routes;
pub mod ws;

pub use connection::{ChannelSink, Connection, ConnectionId, EventSink};
pub use registry::{SessionBroadcaster, SessionRegistry, DEFAULT_IDLE_TIMEOUT};
pub use routes::router;
