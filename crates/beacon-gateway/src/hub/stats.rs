use std::collections::BTreeMap;

use serde::Serialize;

/// Point-in-time counters served by `GET /stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub total_connections: usize,
    /// One per (connection, subscription key) pair.
    pub total_subscriptions: usize,
    /// Channels with at least one subscriber, sorted.
    pub channels: Vec<String>,
    /// Principal id → open connections. Multi-tab users count more than once.
    pub per_principal_connection_counts: BTreeMap<String, usize>,
}
