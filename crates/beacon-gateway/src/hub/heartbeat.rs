use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::hub::manager::ConnectionManager;

/// Run [`ConnectionManager::sweep`] every `interval` until the manager's
/// heartbeat token is cancelled.
pub fn spawn(manager: Arc<ConnectionManager>, interval: Duration) -> JoinHandle<()> {
    let cancel = manager.heartbeat_token();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // first tick completes immediately
        ticker.tick().await;

        info!(interval_secs = interval.as_secs(), "heartbeat supervisor started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = manager.sweep();
                    if report.reclaimed > 0 {
                        info!(probed = report.probed, reclaimed = report.reclaimed, "heartbeat sweep");
                    } else {
                        debug!(probed = report.probed, "heartbeat sweep");
                    }
                }
            }
        }
        info!("heartbeat supervisor stopped");
    })
}
