use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use beacon_auth::{AclDecision, AuthError, ChannelAcl, PermissionOracle};
use beacon_core::config::{
    DEFAULT_QUEUE_CAPACITY, HANDSHAKE_TIMEOUT_MS, MAX_PAYLOAD_BYTES, SHUTDOWN_CLOSE_CODE,
    SHUTDOWN_CLOSE_REASON,
};
use beacon_core::types::{ConnId, Identity};
use beacon_core::BeaconError;
use beacon_protocol::filter::{FilterSignature, SubscriptionKey};
use beacon_protocol::frames::{ClientFrame, Established, ServerFrame};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::hub::record::{ConnectionRecord, Liveness, Outbound, Transport};
use crate::hub::registry::{BucketSnapshot, Matched, SubscriptionRegistry};
use crate::hub::stats::ConnectionStats;
use crate::observe::{DisconnectReason, EventObserver, HubEvent, NoopObserver};

/// Why an upgrade request was refused. No record exists when this is returned.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("missing credential")]
    MissingCredential,

    #[error("authentication failed: {0}")]
    Rejected(#[from] AuthError),

    #[error("permission oracle timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("server is shutting down")]
    ShuttingDown,
}

/// Outcome of a `subscribe` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Confirmed { key: SubscriptionKey, added: bool },
    Denied { required: String },
    /// The connection was already torn down.
    NotConnected,
}

/// What one `broadcast` call did. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub matched: Matched,
    pub recipients: usize,
    pub dropped: usize,
}

/// What one heartbeat sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub reclaimed: usize,
}

/// Records and buckets, always mutated together under one lock.
#[derive(Default)]
struct HubState {
    connections: HashMap<ConnId, ConnectionRecord>,
    registry: SubscriptionRegistry,
}

impl HubState {
    /// Unlink a record from every index. `None` if it was already gone.
    fn remove(&mut self, id: &ConnId) -> Option<ConnectionRecord> {
        let record = self.connections.remove(id)?;
        self.registry.remove_all(id, record.subscriptions.iter());
        Some(record)
    }
}

/// Owns every live connection and the subscription index.
///
/// All mutation goes through `&self` methods that take the single state
/// lock for a short, synchronous critical section. The lock is never held
/// across an `.await`, an oracle call, or observer notification. Socket
/// writes are `try_send`s onto each connection's bounded queue, so a slow
/// client costs a broadcaster nothing beyond a failed enqueue.
pub struct ConnectionManager {
    state: Mutex<HubState>,
    oracle: Arc<dyn PermissionOracle>,
    acl: ChannelAcl,
    observer: Arc<dyn EventObserver>,
    queue_capacity: usize,
    handshake_timeout: Duration,
    shutting_down: AtomicBool,
    heartbeat_cancel: CancellationToken,
    sockets: AtomicUsize,
}

impl ConnectionManager {
    pub fn new(oracle: Arc<dyn PermissionOracle>, acl: ChannelAcl) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            oracle,
            acl,
            observer: Arc::new(NoopObserver),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            handshake_timeout: Duration::from_millis(HANDSHAKE_TIMEOUT_MS),
            shutting_down: AtomicBool::new(false),
            heartbeat_cancel: CancellationToken::new(),
            sockets: AtomicUsize::new(0),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Token the heartbeat supervisor stops on. Cancelled by [`Self::shutdown`].
    pub fn heartbeat_token(&self) -> CancellationToken {
        self.heartbeat_cancel.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    // A panic inside a critical section leaves the maps consistent (every
    // mutation is a single insert/remove), so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── handshake ────────────────────────────────────────────────────────────

    /// Verify a bearer credential with the oracle. Holds no lock.
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<Identity, HandshakeError> {
        if self.is_shutting_down() {
            return Err(HandshakeError::ShuttingDown);
        }
        let credential = match credential {
            Some(c) if !c.is_empty() => c,
            _ => return Err(HandshakeError::MissingCredential),
        };

        match tokio::time::timeout(self.handshake_timeout, self.oracle.verify(credential)).await {
            Ok(Ok(identity)) => Ok(identity),
            Ok(Err(e)) => Err(HandshakeError::Rejected(e)),
            Err(_) => Err(HandshakeError::Timeout {
                ms: self.handshake_timeout.as_millis() as u64,
            }),
        }
    }

    /// Create the record for an authenticated connection and greet it.
    pub fn register(&self, identity: Identity, transport: Transport) -> Result<ConnId, HandshakeError> {
        let record = ConnectionRecord::new(identity, transport);
        let id = record.id.clone();
        let greeting = ServerFrame::ConnectionEstablished {
            data: Established {
                client_id: id.to_string(),
                connected_at: record.connected_at,
                user: record.principal.clone(),
            },
        };
        let event = HubEvent::Connected {
            conn_id: id.clone(),
            principal_id: record.principal.id.clone(),
            username: record.principal.username.clone(),
        };
        let transport = record.transport().clone();
        let record_username = record.principal.username.clone();

        {
            let mut state = self.lock();
            // checked under the lock so shutdown's drain cannot miss this record
            if self.is_shutting_down() {
                return Err(HandshakeError::ShuttingDown);
            }
            state.connections.insert(id.clone(), record);
        }

        info!(conn_id = %id, username = %record_username, "client connected");
        self.observer.on_event(&event);

        if transport.try_send(Outbound::Text(greeting.to_json().into())).is_err() {
            warn!(conn_id = %id, "could not deliver connection.established");
            self.teardown(&id, DisconnectReason::DeliveryFailed);
        }
        Ok(id)
    }

    /// Full handshake: authenticate, then register.
    pub async fn accept(
        &self,
        transport: Transport,
        credential: Option<&str>,
    ) -> Result<ConnId, HandshakeError> {
        let identity = match self.authenticate(credential).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "handshake rejected");
                return Err(e);
            }
        };
        self.register(identity, transport)
    }

    // ── inbound ──────────────────────────────────────────────────────────────

    /// Handle one inbound text frame. Bad frames get an `error` reply; the
    /// connection stays open.
    pub fn on_message(&self, id: &ConnId, raw: &str) {
        if raw.len() > MAX_PAYLOAD_BYTES {
            let err = BeaconError::PayloadTooLarge {
                size: raw.len(),
                max: MAX_PAYLOAD_BYTES,
            };
            warn!(conn_id = %id, code = err.code(), size = raw.len(), "payload too large");
            self.reply(id, ServerFrame::error(err.to_string()));
            return;
        }

        let frame = match ClientFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(conn_id = %id, error = %e, "bad client frame");
                self.reply(id, ServerFrame::error(e.to_string()));
                return;
            }
        };

        match frame {
            ClientFrame::Ping => self.reply(id, ServerFrame::pong()),
            ClientFrame::Subscribe { channel, filters } => {
                self.subscribe(id, &channel, filters);
            }
            ClientFrame::Unsubscribe { channel } => {
                self.unsubscribe(id, &channel);
            }
        }
    }

    /// Add `id` to `(channel, filters)` if the channel ACL allows it, and
    /// reply with the outcome.
    pub fn subscribe(&self, id: &ConnId, channel: &str, filters: Value) -> SubscribeOutcome {
        let (outcome, transport) = {
            let mut state = self.lock();
            let HubState {
                connections,
                registry,
            } = &mut *state;
            let Some(record) = connections.get_mut(id) else {
                return SubscribeOutcome::NotConnected;
            };
            let outcome = match self.acl.check(channel, &record.capabilities) {
                AclDecision::Denied { required } => SubscribeOutcome::Denied { required },
                AclDecision::Allowed => {
                    let key = SubscriptionKey::new(channel, &filters);
                    record.subscriptions.insert(key.clone());
                    let added = registry.insert(key.clone(), id);
                    SubscribeOutcome::Confirmed { key, added }
                }
            };
            (outcome, record.transport().clone())
        };

        let reply = match &outcome {
            SubscribeOutcome::Confirmed { key, added } => {
                debug!(conn_id = %id, %key, added, "subscription confirmed");
                ServerFrame::SubscriptionConfirmed {
                    channel: channel.to_string(),
                    filters,
                }
            }
            SubscribeOutcome::Denied { required } => {
                info!(conn_id = %id, channel, required = %required, "subscription denied");
                ServerFrame::SubscriptionDenied {
                    channel: channel.to_string(),
                    filters: Some(filters),
                    error: format!("Insufficient permissions: '{required}' is required"),
                }
            }
            SubscribeOutcome::NotConnected => return outcome,
        };
        self.send_or_teardown(id, &transport, Outbound::Text(reply.to_json().into()));
        outcome
    }

    /// Drop every subscription `id` holds on `channel`, whatever the filter.
    /// Always confirmed, even when there was nothing to remove.
    pub fn unsubscribe(&self, id: &ConnId, channel: &str) -> usize {
        let (removed, transport) = {
            let mut state = self.lock();
            let HubState {
                connections,
                registry,
            } = &mut *state;
            let Some(record) = connections.get_mut(id) else {
                return 0;
            };
            let keys = record.keys_for_channel(channel);
            for key in &keys {
                record.subscriptions.remove(key);
            }
            (registry.remove_all(id, keys.iter()), record.transport().clone())
        };

        debug!(conn_id = %id, channel, removed, "unsubscribed");
        let reply = ServerFrame::UnsubscriptionConfirmed {
            channel: channel.to_string(),
        };
        self.send_or_teardown(id, &transport, Outbound::Text(reply.to_json().into()));
        removed
    }

    /// Transport pong observed.
    pub fn mark_alive(&self, id: &ConnId) {
        if let Some(record) = self.lock().connections.get_mut(id) {
            record.liveness = Liveness::Alive;
        }
    }

    // ── outbound ─────────────────────────────────────────────────────────────

    /// Fan `payload` out to subscribers of `(channel, filter)`.
    ///
    /// Fire-and-forget: never fails. Connections whose queue cannot take the
    /// event are torn down.
    pub fn broadcast(&self, channel: &str, payload: Value, filter: Option<&Value>) -> BroadcastReport {
        let signature = filter.map(FilterSignature::of).unwrap_or_default();

        let (matched, targets): (Matched, Vec<(ConnId, Transport)>) = {
            let state = self.lock();
            let (matched, ids) = state.registry.resolve(channel, &signature);
            let targets = ids
                .into_iter()
                .filter_map(|id| {
                    let transport = state.connections.get(&id)?.transport().clone();
                    Some((id, transport))
                })
                .collect();
            (matched, targets)
        };

        if targets.is_empty() {
            debug!(channel, filter = %signature, "broadcast with no recipients");
            return BroadcastReport {
                matched,
                recipients: 0,
                dropped: 0,
            };
        }

        let text: Arc<str> = ServerFrame::event(channel, payload).to_json().into();
        let mut dead = Vec::new();
        for (id, transport) in &targets {
            if let Err(e) = transport.try_send(Outbound::Text(text.clone())) {
                warn!(conn_id = %id, channel, error = ?e, "event not delivered");
                dead.push(id.clone());
            }
        }
        for id in &dead {
            self.teardown(id, DisconnectReason::DeliveryFailed);
        }

        let report = BroadcastReport {
            matched,
            recipients: targets.len() - dead.len(),
            dropped: dead.len(),
        };
        debug!(
            channel,
            filter = %signature,
            matched = ?report.matched,
            recipients = report.recipients,
            dropped = report.dropped,
            "broadcast"
        );
        report
    }

    fn reply(&self, id: &ConnId, frame: ServerFrame) {
        let transport = match self.lock().connections.get(id) {
            Some(record) => record.transport().clone(),
            None => return,
        };
        self.send_or_teardown(id, &transport, Outbound::Text(frame.to_json().into()));
    }

    fn send_or_teardown(&self, id: &ConnId, transport: &Transport, frame: Outbound) {
        if let Err(e) = transport.try_send(frame) {
            warn!(conn_id = %id, error = ?e, "reply not delivered");
            self.teardown(id, DisconnectReason::DeliveryFailed);
        }
    }

    // ── teardown ─────────────────────────────────────────────────────────────

    pub fn on_close(&self, id: &ConnId, code: Option<u16>, reason: &str) -> bool {
        self.teardown(
            id,
            DisconnectReason::Closed {
                code,
                reason: reason.to_string(),
            },
        )
    }

    pub fn on_error(&self, id: &ConnId, error: &str) -> bool {
        self.teardown(
            id,
            DisconnectReason::TransportError {
                error: error.to_string(),
            },
        )
    }

    /// Remove a connection from every index and report it once.
    ///
    /// Returns false when the connection was already gone; later calls for
    /// the same id (error then close, heartbeat then close) are no-ops.
    pub fn teardown(&self, id: &ConnId, reason: DisconnectReason) -> bool {
        let Some(record) = self.lock().remove(id) else {
            return false;
        };
        self.release(record, reason);
        true
    }

    /// Signal the socket session to stop and report the disconnect.
    fn release(&self, record: ConnectionRecord, reason: DisconnectReason) {
        record.transport().close();
        let connected_for = (chrono::Utc::now() - record.connected_at)
            .to_std()
            .unwrap_or_default();
        info!(
            conn_id = %record.id,
            principal = %record.principal,
            %reason,
            subscriptions = record.subscriptions.len(),
            "client disconnected"
        );
        self.observer.on_event(&HubEvent::Disconnected {
            conn_id: record.id.clone(),
            principal_id: record.principal.id.clone(),
            reason,
            subscriptions: record.subscriptions.len(),
            connected_for,
        });
    }

    /// Tear a connection down and ask its writer to close the socket.
    pub fn force_close(&self, id: &ConnId, reason: DisconnectReason) -> bool {
        let Some(record) = self.lock().remove(id) else {
            return false;
        };
        if let Err(e) = record.transport().try_send(Outbound::Close {
            code: 1000,
            reason: reason.to_string(),
        }) {
            debug!(conn_id = %id, error = ?e, "close frame not queued");
        }
        self.release(record, reason);
        true
    }

    // ── heartbeat ────────────────────────────────────────────────────────────

    /// One heartbeat pass over every record.
    ///
    /// Records still suspect from the previous pass are force-closed; the
    /// rest become suspect and get a ping. A pong seen by the socket reader
    /// flips them back via [`Self::mark_alive`].
    pub fn sweep(&self) -> SweepReport {
        let (dead, probes) = {
            let mut state = self.lock();
            let mut dead = Vec::new();
            let mut probes = Vec::new();
            for record in state.connections.values_mut() {
                match record.liveness {
                    Liveness::Suspect => dead.push(record.id.clone()),
                    Liveness::Alive => {
                        record.liveness = Liveness::Suspect;
                        probes.push((record.id.clone(), record.transport().clone()));
                    }
                }
            }
            (dead, probes)
        };

        let mut report = SweepReport::default();
        for (id, transport) in probes {
            if transport.try_send(Outbound::Ping).is_ok() {
                report.probed += 1;
            } else if self.force_close(&id, DisconnectReason::DeliveryFailed) {
                report.reclaimed += 1;
            }
        }
        for id in dead {
            warn!(conn_id = %id, "no pong since last probe, closing");
            if self.force_close(&id, DisconnectReason::HeartbeatTimeout) {
                report.reclaimed += 1;
            }
        }
        report
    }

    // ── lifecycle & introspection ────────────────────────────────────────────

    /// Stop the heartbeat, close every connection with 1001, clear all state.
    /// Runs once; later calls return 0.
    pub fn shutdown(&self) -> usize {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return 0;
        }
        self.heartbeat_cancel.cancel();

        let records: Vec<ConnectionRecord> = {
            let mut state = self.lock();
            state.registry.clear();
            state.connections.drain().map(|(_, record)| record).collect()
        };

        let count = records.len();
        info!(connections = count, "closing all connections for shutdown");
        for record in records {
            if let Err(e) = record.transport().try_send(Outbound::Close {
                code: SHUTDOWN_CLOSE_CODE,
                reason: SHUTDOWN_CLOSE_REASON.to_string(),
            }) {
                debug!(conn_id = %record.id, error = ?e, "shutdown close frame not queued");
            }
            self.release(record, DisconnectReason::Shutdown);
        }
        count
    }

    pub fn stats(&self) -> ConnectionStats {
        let state = self.lock();
        let mut per_principal: BTreeMap<String, usize> = BTreeMap::new();
        let mut total_subscriptions = 0;
        for record in state.connections.values() {
            *per_principal.entry(record.principal.id.clone()).or_default() += 1;
            total_subscriptions += record.subscriptions.len();
        }
        ConnectionStats {
            total_connections: state.connections.len(),
            total_subscriptions,
            channels: state.registry.channels(),
            per_principal_connection_counts: per_principal,
        }
    }

    pub fn registry_snapshot(&self) -> Vec<BucketSnapshot> {
        self.lock().registry.snapshot()
    }

    /// Upgraded sockets whose session task is still running. Can briefly
    /// exceed [`Self::connection_count`] while a dropped session winds down.
    pub fn socket_count(&self) -> usize {
        self.sockets.load(Ordering::SeqCst)
    }

    /// Count a socket session until the returned guard is dropped.
    pub fn track_socket(self: &Arc<Self>) -> SocketGuard {
        self.sockets.fetch_add(1, Ordering::SeqCst);
        SocketGuard {
            manager: Arc::clone(self),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    pub fn is_connected(&self, id: &ConnId) -> bool {
        self.lock().connections.contains_key(id)
    }

    pub fn subscriptions_of(&self, id: &ConnId) -> Vec<SubscriptionKey> {
        self.lock()
            .connections
            .get(id)
            .map(|r| r.subscriptions.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Serializable copy of one record, for debugging.
    pub fn record(&self, id: &ConnId) -> Option<ConnectionRecord> {
        self.lock().connections.get(id).cloned()
    }
}

/// Held by a socket session for its whole lifetime.
pub struct SocketGuard {
    manager: Arc<ConnectionManager>,
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        self.manager.sockets.fetch_sub(1, Ordering::SeqCst);
    }
}
