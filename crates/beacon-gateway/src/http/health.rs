use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness probe plus the open connection count.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let status = if state.manager.is_shutting_down() {
        "shutting_down"
    } else {
        "ok"
    };
    Json(json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.manager.connection_count(),
        "sockets": state.manager.socket_count(),
    }))
}
