use thiserror::Error;

#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

impl BeaconError {
    /// Short error code string for HTTP error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            BeaconError::Config(_) => "CONFIG_ERROR",
            BeaconError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
        }
    }
}

pub type Result<T> = std::result::Result<T, BeaconError>;
