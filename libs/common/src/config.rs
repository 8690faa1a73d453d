//! Environment lookup helpers shared by every `*Config::from_env` constructor

use std::{env, str::FromStr};

use crate::error::{ConfigError, ConfigResult};

/// Read a variable, treating an empty or whitespace-only value as absent
pub fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Read a variable that must be present and non-empty
pub fn required(name: &'static str) -> ConfigResult<String> {
    optional(name).ok_or(ConfigError::Missing(name))
}

/// Parse a variable, falling back to `default` when it is unset
///
/// A value that is set but does not parse is an error rather than a silent
/// fallback.
pub fn parse_or<T>(name: &'static str, default: T) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_optional_treats_blank_as_absent() {
        unsafe { env::set_var("COMMON_TEST_BLANK", "   ") };
        assert_eq!(optional("COMMON_TEST_BLANK"), None);
        unsafe { env::remove_var("COMMON_TEST_BLANK") };
    }

    #[test]
    #[serial]
    fn test_required_reports_variable_name() {
        unsafe { env::remove_var("COMMON_TEST_REQUIRED") };
        assert_eq!(
            required("COMMON_TEST_REQUIRED"),
            Err(ConfigError::Missing("COMMON_TEST_REQUIRED"))
        );
    }

    #[test]
    #[serial]
    fn test_parse_or() {
        unsafe { env::remove_var("COMMON_TEST_PORT") };
        assert_eq!(parse_or("COMMON_TEST_PORT", 22u16), Ok(22));

        unsafe { env::set_var("COMMON_TEST_PORT", "2222") };
        assert_eq!(parse_or("COMMON_TEST_PORT", 22u16), Ok(2222));

        unsafe { env::set_var("COMMON_TEST_PORT", "ssh") };
        assert!(matches!(
            parse_or("COMMON_TEST_PORT", 22u16),
            Err(ConfigError::Invalid { name: "COMMON_TEST_PORT", .. })
        ));
        unsafe { env::remove_var("COMMON_TEST_PORT") };
    }
}
