#![allow(dead_code)]

use std::sync::Arc;

use beacon_auth::{ChannelAcl, StaticTokenOracle};
use beacon_core::config::BeaconConfig;
use beacon_core::types::{CapabilitySet, Identity, Principal};
use beacon_gateway::{build_router, AppState, ConnectionManager};

pub const PUBLISH_TOKEN: &str = "publish-secret";

pub fn identity(id: &str, username: &str, caps: &[&str]) -> Identity {
    Identity::new(
        Principal::new(id, username),
        caps.iter().copied().collect::<CapabilitySet>(),
    )
}

pub fn manager() -> ConnectionManager {
    let oracle = StaticTokenOracle::new()
        .with_token("alice-token", identity("u-1", "alice", &[]))
        .with_token("auditor-token", identity("u-2", "bob", &["audit.view"]));
    ConnectionManager::new(
        Arc::new(oracle),
        ChannelAcl::open().with_rule("audit.events", "audit.view"),
    )
}

pub fn state(publish_token: Option<&str>) -> Arc<AppState> {
    let mut config = BeaconConfig::default();
    config.publish.token = publish_token.map(String::from);
    Arc::new(AppState::new(config, Arc::new(manager())))
}

/// State whose connections buffer at most `capacity` outbound frames.
pub fn state_with_queue(capacity: usize) -> Arc<AppState> {
    let manager = manager().with_queue_capacity(capacity);
    Arc::new(AppState::new(BeaconConfig::default(), Arc::new(manager)))
}

pub fn router(state: &Arc<AppState>) -> axum::Router {
    build_router(state.clone())
}
