use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// Protocol constants; clients rely on these values
pub const DEFAULT_PORT: u16 = 8090;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const WS_PATH: &str = "/ws";
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024; // 64 KB hard cap per inbound frame
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000; // oracle must answer within 10s
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30; // probe cadence; staleness bound is 2x
pub const DEFAULT_QUEUE_CAPACITY: usize = 256; // outbound frames buffered per connection
pub const SHUTDOWN_CLOSE_CODE: u16 = 1001;
pub const SHUTDOWN_CLOSE_REASON: &str = "Server shutting down";

/// Top-level config (beacon.toml + BEACON_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeaconConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// How bearer credentials on the upgrade request are verified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Opaque tokens looked up in `auth.tokens`.
    #[default]
    Token,
    /// HMAC-SHA256 signed claims, verified with `auth.secret`.
    Signed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Static token table for `mode = "token"`.
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
    /// Shared signing secret for `mode = "signed"`.
    pub secret: Option<String>,
}

/// One row of the static token table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub principal_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_heartbeat_interval")]
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: HEARTBEAT_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Outbound frames buffered per connection before it counts as a dead consumer.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Channel access table. Channels absent from `acl` are open to any
/// authenticated connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_acl")]
    pub acl: BTreeMap<String, String>,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self { acl: default_acl() }
    }
}

/// HTTP publish endpoint for collaborators running out of process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Bearer token for POST /broadcast. When unset the route answers 404.
    pub token: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_heartbeat_interval() -> u64 {
    HEARTBEAT_INTERVAL_SECS
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_acl() -> BTreeMap<String, String> {
    BTreeMap::from([("audit.events".to_string(), "audit.view".to_string())])
}

impl BeaconConfig {
    /// Load config from a TOML file with BEACON_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.beacon/beacon.toml
    ///
    /// A missing file is not an error; defaults and env still apply.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::BeaconError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(BeaconConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("BEACON_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.beacon/beacon.toml", home)
}
