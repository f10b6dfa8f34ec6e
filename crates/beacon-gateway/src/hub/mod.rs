//! Connection hub: per-connection records, the subscription index, and the
//! manager that owns both.

pub mod heartbeat;
pub mod manager;
pub mod record;
pub mod registry;
pub mod stats;

pub use manager::{
    BroadcastReport, ConnectionManager, HandshakeError, SocketGuard, SubscribeOutcome, SweepReport,
};
pub use record::{ConnectionRecord, DeliveryError, Liveness, Outbound, Transport};
pub use registry::{BucketSnapshot, Matched, SubscriptionRegistry};
pub use stats::ConnectionStats;
