use std::collections::BTreeSet;
use std::sync::Arc;

use beacon_core::types::{CapabilitySet, ConnId, Identity, Principal};
use beacon_protocol::filter::SubscriptionKey;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One frame queued for a connection's socket writer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// JSON text frame. Shared so a broadcast serializes once.
    Text(Arc<str>),
    /// Transport-level heartbeat probe.
    Ping,
    /// Close the socket with this code and reason, then stop writing.
    Close { code: u16, reason: String },
}

/// Why a frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// Writer is not keeping up; the consumer is treated as dead.
    Full,
    /// Writer task is gone.
    Closed,
}

/// Write half of a live connection, as seen by the hub.
///
/// Wraps the bounded queue drained by the socket writer task. Writes never
/// wait: a full queue is reported instead of applying back-pressure.
///
/// The close signal is fired when the hub drops the connection. The socket
/// session watches it, since a writer stuck on a client that stopped reading
/// never notices the queue going away.
#[derive(Debug, Clone)]
pub struct Transport {
    tx: mpsc::Sender<Outbound>,
    closed: CancellationToken,
}

impl Transport {
    /// New transport plus the receiving end for the writer task.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let transport = Self {
            tx,
            closed: CancellationToken::new(),
        };
        (transport, rx)
    }

    /// Tell the session owning this socket to shut it down.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Resolves once [`Self::close`] has been called on any clone.
    pub fn close_signal(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub fn try_send(&self, frame: Outbound) -> Result<(), DeliveryError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Heartbeat state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    /// Answered the last probe (or has not been probed yet).
    Alive,
    /// Probed, no pong seen since.
    Suspect,
}

/// Passive state of one accepted connection.
///
/// Owned and mutated exclusively by the connection manager. Serializable
/// for debugging; the transport handle is not part of the serialized form.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub id: ConnId,
    pub principal: Principal,
    pub capabilities: CapabilitySet,
    pub subscriptions: BTreeSet<SubscriptionKey>,
    pub liveness: Liveness,
    pub connected_at: DateTime<Utc>,
    #[serde(skip)]
    transport: Transport,
}

impl ConnectionRecord {
    pub fn new(identity: Identity, transport: Transport) -> Self {
        Self {
            id: ConnId::new(),
            principal: identity.principal,
            capabilities: identity.capabilities,
            subscriptions: BTreeSet::new(),
            liveness: Liveness::Alive,
            connected_at: Utc::now(),
            transport,
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn is_alive(&self) -> bool {
        self.liveness == Liveness::Alive
    }

    /// Keys this connection holds on `channel`, any filter.
    pub fn keys_for_channel(&self, channel: &str) -> Vec<SubscriptionKey> {
        self.subscriptions
            .iter()
            .filter(|k| k.channel == channel)
            .cloned()
            .collect()
    }
}
