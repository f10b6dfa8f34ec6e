// Well-known envelope `type` values. Must match the web client exactly.

// client → server
pub const PING: &str = "ping";
pub const SUBSCRIBE: &str = "subscribe";
pub const UNSUBSCRIBE: &str = "unsubscribe";

// server → client
pub const CONNECTION_ESTABLISHED: &str = "connection.established";
pub const PONG: &str = "pong";
pub const SUBSCRIPTION_CONFIRMED: &str = "subscription.confirmed";
pub const SUBSCRIPTION_DENIED: &str = "subscription.denied";
pub const UNSUBSCRIPTION_CONFIRMED: &str = "unsubscription.confirmed";
pub const EVENT: &str = "event";
pub const ERROR: &str = "error";
