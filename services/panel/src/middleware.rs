//! Request middleware: the session gate and response hardening

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, header},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::{error::PanelError, state::AppState};

/// Logged-in operator, available to handlers behind [`require_session`]
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
}

/// Reject requests without a logged-in session
///
/// Nothing downstream runs for an anonymous request.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, PanelError> {
    let session = state.sessions.load(req.headers());

    let Some(user) = session.user().filter(|_| session.is_logged_in()) else {
        debug!("Rejected anonymous request to {}", req.uri().path());
        return Err(PanelError::Unauthorized);
    };

    req.extensions_mut().insert(AuthUser {
        username: user.username.clone(),
    });

    Ok(next.run(req).await)
}

/// Security headers middleware
pub async fn security_headers(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    response
}
