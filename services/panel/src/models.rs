//! Request and response bodies

use ilo::FanReading;
use serde::{Deserialize, Serialize};

/// Body of `POST /api/auth/login`
///
/// Both fields are optional so that a request missing one is answered like any
/// other failed login instead of being rejected by the extractor.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// The only shape of non-data responses
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new("ok")
    }
}

/// Fan readings returned by the read endpoints
#[derive(Debug, Serialize)]
pub struct FansResponse {
    pub fans: Vec<FanReading>,
}
