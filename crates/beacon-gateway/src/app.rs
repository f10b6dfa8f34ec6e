use axum::{
    routing::{get, post},
    Router,
};
use beacon_core::config::{BeaconConfig, WS_PATH};
use std::sync::Arc;

use crate::hub::ConnectionManager;

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: BeaconConfig,
    pub manager: Arc<ConnectionManager>,
}

impl AppState {
    pub fn new(config: BeaconConfig, manager: Arc<ConnectionManager>) -> Self {
        Self { config, manager }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/stats", get(crate::http::stats::stats_handler))
        .route("/stats/registry", get(crate::http::stats::registry_handler))
        .route("/broadcast", post(crate::http::publish::publish_handler))
        .route(WS_PATH, get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
