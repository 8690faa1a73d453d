//! Application state shared across handlers

use axum::extract::FromRef;
use ilo::FanController;
use std::sync::Arc;

use crate::{credentials::AuthConfig, rate_limiter::LoginLimiter, session::SessionManager};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<AuthConfig>,
    pub sessions: SessionManager,
    pub login_limiter: LoginLimiter,
    pub fans: Arc<dyn FanController>,
    /// Whether this process terminates TLS itself
    pub connection_encrypted: bool,
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}
