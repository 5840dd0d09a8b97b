//! HTTP routes

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};

use super::registry::SessionRegistry;
use super::ws::chat_handler;

/// Build the application router
pub fn router(registry: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/ws/chat/{session_id}", get(chat_handler))
        .route("/api/profiles", get(list_profiles))
        .route("/api/sessions", get(list_sessions))
        .route("/health", get(health))
        .with_state(registry)
}

/// GET /api/profiles - Configured profile names.
async fn list_profiles(State(registry): State<Arc<SessionRegistry>>) -> Json<Vec<String>> {
    Json(registry.factory().profile_names())
}

/// GET /api/sessions - Stored session ids, newest first.
async fn list_sessions(State(registry): State<Arc<SessionRegistry>>) -> Json<Vec<String>> {
    Json(registry.store().list().await)
}

/// GET /health
async fn health(State(registry): State<Arc<SessionRegistry>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "active_sessions": registry.session_ids().await.len(),
        "shutdown_pending": registry.shutdown_pending(),
    }))
}
