//! iLO client error types

use thiserror::Error;

/// Errors raised while talking to the management controller
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Device credentials are not configured; no transport was attempted
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingConfig(Vec<&'static str>),

    /// A fan speed request failed the client-side bounds check
    #[error("Invalid fan speed request: {0}")]
    InvalidRequest(String),

    /// The Redfish endpoint answered with a non-success status
    #[error("Unable to fetch fan data ({0})")]
    Status(u16),

    /// HTTP transport failure
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// The Redfish payload could not be decoded
    #[error("Failed to parse device response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Network or shell failure talking to the device
    #[error("{0}")]
    Transport(String),

    /// The shell rejected the configured credentials
    #[error("SSH authentication failed")]
    AuthenticationFailed,

    /// The device did not answer within the configured timeout
    #[error("Device request timed out")]
    Timeout,

    /// Anything else; its text is never shown to clients
    #[error("Unknown device error")]
    Unknown(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl DeviceError {
    /// Message safe to hand to a client
    ///
    /// Recognized failures pass their text through. Unknown failures collapse
    /// to `fallback` so nothing from the inner value leaks.
    pub fn public_message(&self, fallback: &str) -> String {
        match self {
            DeviceError::Unknown(_) => fallback.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<russh::Error> for DeviceError {
    fn from(e: russh::Error) -> Self {
        DeviceError::Transport(e.to_string())
    }
}

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;
