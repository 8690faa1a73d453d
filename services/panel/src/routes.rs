//! Panel routes
//!
//! `/health` and `/api/auth/login` are public. Everything else sits behind
//! [`require_session`], which answers 401 before a handler or the device is
//! reached.

use axum::{
    Extension, Json, Router,
    extract::{ConnectInfo, State, rejection::JsonRejection},
    http::HeaderMap,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::Value;
use std::net::SocketAddr;
use tracing::{error, info, warn};

use crate::{
    error::{PanelError, PanelResult, method_not_allowed},
    middleware::{AuthUser, require_session, security_headers},
    models::{FansResponse, LoginRequest, MessageResponse},
    origin,
    rate_limiter::Attempt,
    session::{Session, SessionUser},
    state::AppState,
    validation::validate_fan_request,
};

const INVALID_REQUEST: &str = "Invalid request";

/// Create the router for the panel service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/api/auth/logout",
            post(logout).fallback(|| async { method_not_allowed("POST") }),
        )
        .route(
            "/api/fans",
            get(get_fans)
                .post(set_fans)
                .fallback(|| async { method_not_allowed("GET, POST") }),
        )
        .route(
            "/api/fans/unlock",
            post(unlock_fans).fallback(|| async { method_not_allowed("POST") }),
        )
        .route(
            "/api/unlock",
            post(unlock_fans).fallback(|| async { method_not_allowed("POST") }),
        )
        .route(
            "/api/temps",
            get(get_temps).fallback(|| async { method_not_allowed("GET") }),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/auth/login",
            post(login).fallback(|| async { method_not_allowed("POST") }),
        )
        .merge(protected_routes)
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "ilo-fan-panel"
    }))
}

/// Operator login endpoint
///
/// Every request claims one of the address's attempts before credentials are
/// compared, whether the body was right, wrong or unreadable. A match gives
/// the attempt back.
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut session: Session,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> PanelResult<impl IntoResponse> {
    let address = peer.ip().to_string();

    let attempt = state.login_limiter.reserve(&address).await.map_err(|e| {
        error!("Failed to count login attempt: {}", e);
        PanelError::Internal
    })?;
    if attempt == Attempt::Blocked {
        warn!("Refused login from rate limited address {}", address);
        return Err(PanelError::RateLimited);
    }

    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let username = request.username.unwrap_or_default();
    let password = request.password.unwrap_or_default();

    if !state.credentials.verify(&username, &password) {
        info!("Failed login from {}", address);
        return Err(PanelError::InvalidCredentials);
    }

    state.login_limiter.clear(&address).await.map_err(|e| {
        error!("Failed to clear login attempts: {}", e);
        PanelError::Internal
    })?;

    session.set_user(SessionUser {
        username,
        is_logged_in: true,
    });
    let jar = session.save().map_err(|e| {
        error!("Failed to seal session: {}", e);
        PanelError::Internal
    })?;

    info!("Operator logged in from {}", address);
    Ok((jar, Json(MessageResponse::ok())))
}

/// Logout endpoint
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    session: Session,
) -> PanelResult<impl IntoResponse> {
    if !origin::validate(&headers, state.connection_encrypted) {
        warn!("Rejected logout for {} with mismatched origin", user.username);
        return Err(PanelError::Forbidden);
    }

    info!("{} logged out", user.username);
    Ok((session.destroy(), Json(MessageResponse::ok())))
}

/// Current fan readings
pub async fn get_fans(State(state): State<AppState>) -> PanelResult<Json<FansResponse>> {
    let fans = state.fans.fetch_fans().await.map_err(|e| {
        error!("Failed to fetch fans: {}", e);
        PanelError::Device(e.public_message("Unknown error"))
    })?;

    Ok(Json(FansResponse { fans }))
}

/// Fan readings for the temperature view
pub async fn get_temps(State(state): State<AppState>) -> PanelResult<Json<FansResponse>> {
    let fans = state.fans.fetch_fans().await.map_err(|e| {
        error!("Failed to fetch temperatures: {}", e);
        PanelError::Device(e.public_message("Internal Server Error"))
    })?;

    Ok(Json(FansResponse { fans }))
}

/// Pin fan speeds
pub async fn set_fans(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<Value>, JsonRejection>,
) -> PanelResult<Json<MessageResponse>> {
    let Ok(Json(body)) = payload else {
        warn!("Rejected unreadable fan speed request");
        return Err(PanelError::BadRequest(INVALID_REQUEST.to_string()));
    };

    let request = validate_fan_request(&body).map_err(|errors| {
        warn!(
            "Rejected fan speed request with {} invalid field(s)",
            errors.0.len()
        );
        PanelError::BadRequest(INVALID_REQUEST.to_string())
    })?;

    state.fans.set_fan_speeds(&request).await.map_err(|e| {
        error!("Failed to set fan speeds: {}", e);
        PanelError::BadRequest(e.public_message(INVALID_REQUEST))
    })?;

    info!("{} pinned {} fan(s)", user.username, request.fans.len());
    Ok(Json(MessageResponse::ok()))
}

/// Hand every fan back to automatic control
pub async fn unlock_fans(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> PanelResult<Json<MessageResponse>> {
    state.fans.unlock_fans().await.map_err(|e| {
        error!("Failed to unlock fans: {}", e);
        PanelError::BadRequest(e.public_message("Unable to unlock fans"))
    })?;

    info!("{} unlocked all fans", user.username);
    Ok(Json(MessageResponse::ok()))
}
