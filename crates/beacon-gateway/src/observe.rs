//! Lifecycle notifications for metrics/audit collaborators.
//!
//! The hub reports `client.connected` / `client.disconnected` through an
//! injected [`EventObserver`]. Observers run inline on the hub's call path,
//! so they must not block; forward to a queue if real work is needed
//! ([`ChannelObserver`] does exactly that).

use std::fmt;
use std::time::Duration;

use beacon_core::types::ConnId;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Why a connection was torn down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisconnectReason {
    /// Client closed the socket (or it ended without a close frame).
    Closed { code: Option<u16>, reason: String },
    /// Transport read error.
    TransportError { error: String },
    /// No pong between two heartbeat probes.
    HeartbeatTimeout,
    /// Outbound queue full or writer gone during a send.
    DeliveryFailed,
    /// Server shutdown.
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Closed { code: Some(code), reason } if !reason.is_empty() => {
                write!(f, "closed ({code}: {reason})")
            }
            DisconnectReason::Closed { code: Some(code), .. } => write!(f, "closed ({code})"),
            DisconnectReason::Closed { .. } => f.write_str("closed"),
            DisconnectReason::TransportError { error } => write!(f, "transport error: {error}"),
            DisconnectReason::HeartbeatTimeout => f.write_str("heartbeat timeout"),
            DisconnectReason::DeliveryFailed => f.write_str("delivery failed"),
            DisconnectReason::Shutdown => f.write_str("server shutdown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum HubEvent {
    #[serde(rename = "client.connected")]
    Connected {
        conn_id: ConnId,
        principal_id: String,
        username: String,
    },
    #[serde(rename = "client.disconnected")]
    Disconnected {
        conn_id: ConnId,
        principal_id: String,
        reason: DisconnectReason,
        subscriptions: usize,
        #[serde(with = "duration_ms")]
        connected_for: Duration,
    },
}

impl HubEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HubEvent::Connected { .. } => "client.connected",
            HubEvent::Disconnected { .. } => "client.disconnected",
        }
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

pub trait EventObserver: Send + Sync {
    fn on_event(&self, event: &HubEvent);
}

/// Default observer: drops everything.
pub struct NoopObserver;

impl EventObserver for NoopObserver {
    fn on_event(&self, _event: &HubEvent) {}
}

/// Writes each event to the log.
pub struct TracingObserver;

impl EventObserver for TracingObserver {
    fn on_event(&self, event: &HubEvent) {
        match event {
            HubEvent::Connected {
                conn_id, username, ..
            } => info!(event = event.name(), %conn_id, username, "hub event"),
            HubEvent::Disconnected {
                conn_id,
                reason,
                connected_for,
                ..
            } => info!(
                event = event.name(),
                %conn_id,
                %reason,
                connected_ms = connected_for.as_millis() as u64,
                "hub event"
            ),
        }
    }
}

/// Forwards events into a bounded queue. A full queue drops the event.
pub struct ChannelObserver {
    tx: mpsc::Sender<HubEvent>,
}

impl ChannelObserver {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<HubEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl EventObserver for ChannelObserver {
    fn on_event(&self, event: &HubEvent) {
        if self.tx.try_send(event.clone()).is_err() {
            debug!(event = event.name(), "observer queue full or closed, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_reason_display() {
        let closed = DisconnectReason::Closed {
            code: Some(1000),
            reason: "bye".into(),
        };
        assert_eq!(closed.to_string(), "closed (1000: bye)");
        assert_eq!(
            DisconnectReason::Closed {
                code: None,
                reason: String::new()
            }
            .to_string(),
            "closed"
        );
        assert_eq!(DisconnectReason::HeartbeatTimeout.to_string(), "heartbeat timeout");
    }

    #[test]
    fn event_serializes_with_dotted_name() {
        let ev = HubEvent::Disconnected {
            conn_id: ConnId::from("c1"),
            principal_id: "u-1".into(),
            reason: DisconnectReason::HeartbeatTimeout,
            subscriptions: 2,
            connected_for: Duration::from_millis(1500),
        };
        let value = serde_json::to_value(&ev).unwrap();
        assert_eq!(value["event"], "client.disconnected");
        assert_eq!(value["reason"]["kind"], "heartbeat_timeout");
        assert_eq!(value["connected_for"], 1500);
        assert_eq!(ev.name(), "client.disconnected");
    }

    #[tokio::test]
    async fn channel_observer_forwards_and_drops_when_full() {
        let (observer, mut rx) = ChannelObserver::new(1);
        let ev = HubEvent::Connected {
            conn_id: ConnId::from("c1"),
            principal_id: "u-1".into(),
            username: "alice".into(),
        };
        observer.on_event(&ev);
        observer.on_event(&ev);
        assert_eq!(rx.recv().await, Some(ev));
        assert!(rx.try_recv().is_err());
    }
}
