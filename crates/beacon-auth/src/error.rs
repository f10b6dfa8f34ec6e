use thiserror::Error;

/// Handshake-time authentication failures. Kept separate from BeaconError so
/// the gateway can map them to HTTP rejections without coupling layers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("credential expired")]
    Expired,

    /// The oracle could not be reached or gave up; the client may retry later.
    #[error("permission oracle unavailable: {0}")]
    Unavailable(String),

    #[error("auth misconfigured: {0}")]
    Misconfigured(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
