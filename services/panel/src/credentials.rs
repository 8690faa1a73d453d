//! Operator credentials and constant-time comparison

use common::{
    config::required,
    error::{ConfigError, ConfigResult},
};
use std::fmt;
use subtle::ConstantTimeEq;

/// Compare a client-supplied value against a configured secret
///
/// Equal-length inputs are compared over every byte regardless of where they
/// first differ. When the lengths differ the secret is compared against itself
/// before returning `false`, so the only observable branch is the length class.
pub fn constant_time_eq(candidate: &str, secret: &str) -> bool {
    let candidate = candidate.as_bytes();
    let secret = secret.as_bytes();

    if candidate.len() != secret.len() {
        std::hint::black_box(secret.ct_eq(secret));
        return false;
    }

    candidate.ct_eq(secret).into()
}

/// The single operator account allowed to log in
#[derive(Clone)]
pub struct AuthConfig {
    username: String,
    password: String,
}

impl AuthConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> ConfigResult<Self> {
        let username = username.into();
        let password = password.into();
        if username.is_empty() {
            return Err(ConfigError::Missing("AUTH_USERNAME"));
        }
        if password.is_empty() {
            return Err(ConfigError::Missing("AUTH_PASSWORD"));
        }
        Ok(Self { username, password })
    }

    /// Create a new AuthConfig from environment variables
    ///
    /// # Environment Variables
    /// - `AUTH_USERNAME`: operator login name
    /// - `AUTH_PASSWORD`: operator password
    pub fn from_env() -> ConfigResult<Self> {
        Self::new(required("AUTH_USERNAME")?, required("AUTH_PASSWORD")?)
    }

    /// Check a login attempt
    ///
    /// Both fields are always compared so the response time does not reveal
    /// whether the username alone was right.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        if username.is_empty() || password.is_empty() {
            return false;
        }

        let username_ok = constant_time_eq(username, &self.username);
        let password_ok = constant_time_eq(password, &self.password);
        username_ok & password_ok
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_equal_strings_match() {
        for value in ["", "a", "admin", "p@ssw0rd with spaces", "ünïcödé"] {
            assert!(constant_time_eq(value, value), "{value:?} should match itself");
        }
    }

    #[test]
    fn test_equal_length_mismatch_anywhere() {
        let secret = "correct-horse-battery";
        let first = "Xorrect-horse-battery";
        let middle = "correct-hXrse-battery";
        let last = "correct-horse-batterX";

        for candidate in [first, middle, last] {
            assert_eq!(candidate.len(), secret.len());
            assert!(!constant_time_eq(candidate, secret));
        }
    }

    #[test]
    fn test_length_mismatch() {
        assert!(!constant_time_eq("admin", "admin1"));
        assert!(!constant_time_eq("admin1", "admin"));
        assert!(!constant_time_eq("", "admin"));
    }

    #[test]
    fn test_verify() {
        let auth = AuthConfig::new("operator", "hunter2hunter2").unwrap();

        assert!(auth.verify("operator", "hunter2hunter2"));
        assert!(!auth.verify("operator", "hunter2hunter3"));
        assert!(!auth.verify("operatoR", "hunter2hunter2"));
        assert!(!auth.verify("", ""));
        assert!(!auth.verify("operator", ""));
    }

    #[test]
    fn test_empty_credentials_are_rejected() {
        assert_eq!(
            AuthConfig::new("", "secret").unwrap_err(),
            ConfigError::Missing("AUTH_USERNAME")
        );
        assert_eq!(
            AuthConfig::new("operator", "").unwrap_err(),
            ConfigError::Missing("AUTH_PASSWORD")
        );
    }

    #[test]
    #[serial]
    fn test_from_env_requires_both_variables() {
        unsafe {
            std::env::set_var("AUTH_USERNAME", "operator");
            std::env::remove_var("AUTH_PASSWORD");
        }
        assert_eq!(
            AuthConfig::from_env().unwrap_err(),
            ConfigError::Missing("AUTH_PASSWORD")
        );

        unsafe { std::env::set_var("AUTH_PASSWORD", "hunter2hunter2") };
        let auth = AuthConfig::from_env().unwrap();
        assert!(auth.verify("operator", "hunter2hunter2"));

        unsafe {
            std::env::remove_var("AUTH_USERNAME");
            std::env::remove_var("AUTH_PASSWORD");
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let auth = AuthConfig::new("operator", "hunter2hunter2").unwrap();
        assert!(!format!("{auth:?}").contains("hunter2"));
    }
}
