//! WebSocket endpoint
//!
//! `GET /ws/chat/{session_id}?profile=&user_id=` upgrades to a socket that
//! is attached to the session. One writer task drains the connection's
//! queue into the socket; the read loop hands every text frame to the
//! registry.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use super::connection::Connection;
use super::registry::SessionRegistry;

#[derive(Debug, Default, Deserialize)]
pub struct ChatQuery {
    pub profile: Option<String>,
    pub user_id: Option<String>,
}

/// Upgrade handler
pub async fn chat_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(query): Query<ChatQuery>,
    State(registry): State<Arc<SessionRegistry>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, registry, session_id, query))
}

async fn handle_socket(
    socket: WebSocket,
    registry: Arc<SessionRegistry>,
    session_id: String,
    query: ChatQuery,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (connection, mut outbound) = Connection::channel();
    let connection_id = connection.id();

    let write_task = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if ws_sender.send(Message::text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    if !registry
        .connect(connection, &session_id, query.profile.as_deref())
        .await
    {
        // The connection was dropped with the error frame queued; the writer
        // flushes it and ends.
        let _ = write_task.await;
        return;
    }

    while let Some(frame) = ws_receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "WebSocket read error");
                break;
            }
        };

        match frame {
            Message::Text(text) => {
                if let Err(e) = registry
                    .handle_client_message(
                        &session_id,
                        connection_id,
                        query.user_id.as_deref(),
                        text.as_str(),
                    )
                    .await
                {
                    tracing::warn!(session_id = %session_id, error = %e, "Cannot handle client frame");
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    registry.disconnect(connection_id, &session_id).await;
    write_task.abort();
}
