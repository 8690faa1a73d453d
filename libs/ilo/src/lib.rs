//! HPE iLO client
//!
//! Reads fan sensors through the Redfish API and drives fan overrides through
//! the controller's SSH command shell. Every device call checks that the
//! controller credentials are configured before any connection is attempted,
//! is bounded by a timeout and is never retried.

pub mod client;
pub mod error;
pub mod models;
pub mod shell;

pub use client::{FanController, IloClient, IloConfig, IloCredentials};
pub use error::{DeviceError, DeviceResult};
pub use models::{
    DeviceCommand, FanReading, FanSpeedRequest, MAX_FAN_PERCENT, MIN_FAN_PERCENT, percent_to_raw,
};
