//! Custom error types for the common library
//!
//! Configuration problems are fatal: they are raised while the service is
//! starting (or right before the first use of a collaborator) and are never
//! turned into per-request responses.

use thiserror::Error;

/// Error raised while reading configuration from the environment
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is absent or empty
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    /// A variable is present but its value is unusable
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Type alias for Result with ConfigError
pub type ConfigResult<T> = Result<T, ConfigError>;
