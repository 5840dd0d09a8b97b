//! Client connections
//!
//! A `Connection` is one open duplex channel to one client. The registry
//! only ever writes serialized envelopes to it through an [`EventSink`];
//! the transport (WebSocket, test recorder) lives behind the sink.
//!
//! Sinks queue and return immediately. A client that stops reading only
//! grows its own queue; broadcasts to the other viewers never wait on it.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::{RelayError, RelayResult};

/// Identifier of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outbound half of a connection
pub trait EventSink: Send + Sync {
    /// Queue one serialized envelope without waiting for delivery
    fn send_text(&self, text: String) -> RelayResult<()>;
}

/// Sink feeding a connection's writer task
///
/// Each connection has exactly one writer draining this queue, so frames
/// reach the client in the order they were queued.
#[derive(Debug, Clone)]
pub struct ChannelSink(mpsc::UnboundedSender<String>);

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self(sender)
    }
}

impl EventSink for ChannelSink {
    fn send_text(&self, text: String) -> RelayResult<()> {
        self.0.send(text).map_err(|_| RelayError::ChannelClosed)
    }
}

/// One client attached to a session
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    sink: Arc<dyn EventSink>,
}

impl Connection {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            id: ConnectionId::new(),
            sink,
        }
    }

    /// Connection backed by a channel, returning the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(Arc::new(ChannelSink::new(tx))), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn send_text(&self, text: String) -> RelayResult<()> {
        self.sink.send_text(text)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_connection_preserves_order() {
        let (connection, mut rx) = Connection::channel();
        connection.send_text("one".into()).unwrap();
        connection.send_text("two".into()).unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("one"));
        assert_eq!(rx.recv().await.as_deref(), Some("two"));
    }

    #[test]
    fn test_unread_connection_never_blocks() {
        let (connection, _rx) = Connection::channel();
        for i in 0..10_000 {
            connection.send_text(format!("frame {}", i)).unwrap();
        }
    }

    #[test]
    fn test_closed_channel_errors() {
        let (connection, rx) = Connection::channel();
        drop(rx);

        let err = connection.send_text("lost".into()).unwrap_err();
        assert!(matches!(err, RelayError::ChannelClosed));
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }
}
