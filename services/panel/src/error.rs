//! Route boundary errors
//!
//! Every failure leaving a handler is one of these variants. Responses carry
//! only a `message` string: no error codes, no stack traces and nothing echoed
//! from the request.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::MessageResponse;

/// Custom error type for the panel service
#[derive(Error, Debug)]
pub enum PanelError {
    /// No logged-in session
    #[error("Unauthorized")]
    Unauthorized,

    /// Wrong or malformed login credentials
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Origin check failed on a state-changing request
    #[error("Forbidden")]
    Forbidden,

    /// Too many failed logins from one address
    #[error("Too many login attempts. Please try again later.")]
    RateLimited,

    /// Invalid input or a rejected device command
    #[error("{0}")]
    BadRequest(String),

    /// The device could not be read
    #[error("{0}")]
    Device(String),

    /// Anything the client should not learn more about
    #[error("Internal Server Error")]
    Internal,
}

impl PanelError {
    pub fn status(&self) -> StatusCode {
        match self {
            PanelError::Unauthorized | PanelError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            PanelError::Forbidden => StatusCode::FORBIDDEN,
            PanelError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            PanelError::BadRequest(_) => StatusCode::BAD_REQUEST,
            PanelError::Device(_) | PanelError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PanelError {
    fn into_response(self) -> Response {
        (self.status(), Json(MessageResponse::new(self.to_string()))).into_response()
    }
}

/// 405 answer listing the methods a route accepts
pub fn method_not_allowed(allow: &'static str) -> Response {
    let mut response = (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(MessageResponse::new("Method Not Allowed")),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(allow));
    response
}

/// Type alias for handler results
pub type PanelResult<T> = Result<T, PanelError>;
