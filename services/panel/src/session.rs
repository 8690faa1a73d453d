//! Session management using sealed cookies
//!
//! The whole session lives in the client's cookie, encrypted and authenticated
//! with a key derived from `SESSION_SECRET`; the server keeps no session
//! store. A cookie that does not decrypt, does not parse or has outlived its
//! embedded expiry loads as an empty, anonymous session.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar, SameSite};
use chrono::Utc;
use common::{
    config::{optional, required},
    error::{ConfigError, ConfigResult},
};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, fmt, time::Duration};
use tracing::debug;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "ilo_fan_controller_session";

/// Lifetime of a session after login
pub const SESSION_TTL: Duration = Duration::from_secs(60 * 60 * 24);

const MIN_SECRET_LEN: usize = 32;

/// Values shipped in sample configuration files
const KNOWN_SECRET_PLACEHOLDERS: &[&str] = &[
    "CHANGE_ME_generate_random_32_char_string",
    "complex_password_at_least_32_characters_long",
];

/// Session cookie configuration
#[derive(Clone)]
pub struct SessionConfig {
    secret: String,
    /// Mark the cookie `Secure`
    pub secure: bool,
}

impl SessionConfig {
    /// Validate the sealing secret
    pub fn new(secret: impl Into<String>, secure: bool) -> ConfigResult<Self> {
        let secret = secret.into();

        if secret.is_empty() {
            return Err(ConfigError::Missing("SESSION_SECRET"));
        }
        if secret.chars().count() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                name: "SESSION_SECRET",
                reason: format!("must be at least {} characters long", MIN_SECRET_LEN),
            });
        }
        if KNOWN_SECRET_PLACEHOLDERS.contains(&secret.as_str()) {
            return Err(ConfigError::Invalid {
                name: "SESSION_SECRET",
                reason: "must not be a placeholder value".to_string(),
            });
        }

        Ok(Self { secret, secure })
    }

    /// Create a new SessionConfig from environment variables
    ///
    /// # Environment Variables
    /// - `SESSION_SECRET`: sealing secret, at least 32 characters, not a placeholder
    /// - `APP_ENV`: `production` marks the cookie `Secure`
    pub fn from_env() -> ConfigResult<Self> {
        let secret = required("SESSION_SECRET")?;
        let secure = optional("APP_ENV").is_some_and(|env| env.eq_ignore_ascii_case("production"));
        Self::new(secret, secure)
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("secure", &self.secure)
            .finish()
    }
}

/// Login state carried by the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub username: String,
    pub is_logged_in: bool,
}

/// Sealed cookie payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionData {
    #[serde(default)]
    user: Option<SessionUser>,
    /// Unix timestamp after which the payload is ignored
    #[serde(default)]
    expires_at: i64,
}

/// Seals and unseals sessions
#[derive(Clone)]
pub struct SessionManager {
    key: Key,
    secure: bool,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            key: Key::derive_from(config.secret.as_bytes()),
            secure: config.secure,
            ttl: SESSION_TTL,
        }
    }

    /// Override the session lifetime
    #[cfg(test)]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Unseal the session carried by a request
    pub fn load(&self, headers: &HeaderMap) -> Session {
        let jar = PrivateCookieJar::from_headers(headers, self.key.clone());

        let data = jar
            .get(SESSION_COOKIE)
            .and_then(|cookie| match serde_json::from_str::<SessionData>(cookie.value()) {
                Ok(data) => Some(data),
                Err(e) => {
                    debug!("Discarding unreadable session payload: {}", e);
                    None
                }
            })
            .filter(|data| {
                let live = data.expires_at > Utc::now().timestamp();
                if !live {
                    debug!("Discarding expired session");
                }
                live
            })
            .unwrap_or_default();

        Session {
            jar,
            data,
            secure: self.secure,
            ttl: self.ttl,
        }
    }
}

/// A request's session
///
/// Changes only reach the client through the jar returned by [`Session::save`]
/// or [`Session::destroy`], which must be part of the response.
pub struct Session {
    jar: PrivateCookieJar,
    data: SessionData,
    secure: bool,
    ttl: Duration,
}

impl Session {
    pub fn user(&self) -> Option<&SessionUser> {
        self.data.user.as_ref()
    }

    /// Only an explicit `isLoggedIn: true` counts as authenticated
    pub fn is_logged_in(&self) -> bool {
        self.data.user.as_ref().is_some_and(|user| user.is_logged_in)
    }

    pub fn set_user(&mut self, user: SessionUser) {
        self.data.user = Some(user);
    }

    /// Seal the session into a fresh cookie valid for the session lifetime
    pub fn save(mut self) -> serde_json::Result<PrivateCookieJar> {
        let ttl_secs = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        self.data.expires_at = Utc::now().timestamp().saturating_add(ttl_secs);
        let payload = serde_json::to_string(&self.data)?;

        let cookie = Cookie::build((SESSION_COOKIE, payload))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(time::Duration::seconds(ttl_secs));

        Ok(self.jar.add(cookie))
    }

    /// Clear the session cookie on the client
    pub fn destroy(self) -> PrivateCookieJar {
        self.jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    SessionManager: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(SessionManager::from_ref(state).load(&parts.headers))
    }
}
