use axum::{extract::State, Json};
use std::sync::Arc;

use crate::app::AppState;
use crate::hub::{BucketSnapshot, ConnectionStats};

/// GET /stats
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<ConnectionStats> {
    Json(state.manager.stats())
}

/// GET /stats/registry: every bucket with its members, for debugging fan-out.
pub async fn registry_handler(State(state): State<Arc<AppState>>) -> Json<Vec<BucketSnapshot>> {
    Json(state.manager.registry_snapshot())
}
