//! Fan speed request validation
//!
//! Requests arrive as arbitrary JSON. Only `fans` is read; every other
//! top-level field is dropped here and never reaches the device layer.

use ilo::{FanSpeedRequest, MAX_FAN_PERCENT, MIN_FAN_PERCENT};
use serde_json::Value;
use std::fmt;

/// How many problems to collect before giving up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Stop at the first invalid field
    AbortEarly,
    /// Report every invalid field
    CollectAll,
}

/// One rejected field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Every problem found in a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .0
            .iter()
            .map(|error| format!("{}: {}", error.path, error.message))
            .collect();
        write!(f, "{}", rendered.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Validate a fan speed request, reporting every invalid field
pub fn validate_fan_request(input: &Value) -> Result<FanSpeedRequest, ValidationErrors> {
    validate_fan_request_with(input, ValidationMode::CollectAll)
}

pub fn validate_fan_request_with(
    input: &Value,
    mode: ValidationMode,
) -> Result<FanSpeedRequest, ValidationErrors> {
    let Some(object) = input.as_object() else {
        return Err(ValidationErrors(vec![FieldError::new(
            "",
            "request body must be an object",
        )]));
    };

    let entries = match object.get("fans") {
        None | Some(Value::Null) => {
            return Err(ValidationErrors(vec![FieldError::new(
                "fans",
                "fans is a required field",
            )]));
        }
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(ValidationErrors(vec![FieldError::new(
                "fans",
                "fans must be an array",
            )]));
        }
    };

    let mut fans = Vec::with_capacity(entries.len());
    let mut errors = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        match fan_percent(entry) {
            Ok(percent) => fans.push(percent),
            Err(message) => {
                errors.push(FieldError::new(format!("fans[{index}]"), message));
                if mode == ValidationMode::AbortEarly {
                    break;
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(FanSpeedRequest::new(fans))
    } else {
        Err(ValidationErrors(errors))
    }
}

/// A finite, integer-valued number within the supported range
fn fan_percent(value: &Value) -> Result<u8, String> {
    let Value::Number(number) = value else {
        return Err("must be a number".to_string());
    };

    let integer = match (number.as_i64(), number.as_f64()) {
        (Some(integer), _) => integer,
        (None, Some(float)) if float.is_finite() && float.fract() == 0.0 => {
            if float < i64::MIN as f64 || float > i64::MAX as f64 {
                return Err(out_of_range());
            }
            float as i64
        }
        (None, Some(float)) if float.is_finite() => return Err("must be an integer".to_string()),
        _ => return Err("must be a finite number".to_string()),
    };

    if !(i64::from(MIN_FAN_PERCENT)..=i64::from(MAX_FAN_PERCENT)).contains(&integer) {
        return Err(out_of_range());
    }

    u8::try_from(integer).map_err(|_| out_of_range())
}

fn out_of_range() -> String {
    format!(
        "must be between {} and {}",
        MIN_FAN_PERCENT, MAX_FAN_PERCENT
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fans(input: Value) -> Vec<u8> {
        validate_fan_request(&input).unwrap().fans
    }

    #[test]
    fn test_valid_payloads() {
        assert_eq!(fans(json!({ "fans": [50, 60, 70, 80] })), vec![50, 60, 70, 80]);
        assert_eq!(fans(json!({ "fans": [10] })), vec![10]);
        assert_eq!(fans(json!({ "fans": [100] })), vec![100]);
        assert_eq!(fans(json!({ "fans": [] })), Vec::<u8>::new());
    }

    #[test]
    fn test_integer_valued_floats_are_accepted() {
        assert_eq!(fans(json!({ "fans": [50.0] })), vec![50]);
    }

    #[test]
    fn test_out_of_range_values() {
        for value in [json!(5), json!(150), json!(-1), json!(9), json!(101), json!(u64::MAX)] {
            assert!(
                validate_fan_request(&json!({ "fans": [value] })).is_err(),
                "{value} should be rejected"
            );
        }
        assert!(validate_fan_request(&json!({ "fans": [9_007_199_254_740_991i64] })).is_err());
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        for value in [
            json!("abc"),
            json!("; rm -rf /"),
            json!("<script>alert(1)</script>"),
            json!("50"),
            json!(true),
            json!(null),
            json!({ "nested": { "deep": true } }),
            json!([50]),
            json!(50.5),
        ] {
            assert!(
                validate_fan_request(&json!({ "fans": [value] })).is_err(),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn test_missing_or_null_fans() {
        for input in [json!({}), json!({ "fans": null }), json!({ "fans": 50 }), json!(null), json!([50])] {
            assert!(validate_fan_request(&input).is_err(), "{input} should be rejected");
        }
    }

    #[test]
    fn test_unknown_fields_are_stripped() {
        let request = validate_fan_request(&json!({
            "fans": [50],
            "isAdmin": true,
            "__proto__": { "isAdmin": true },
            "constructor": { "prototype": {} }
        }))
        .unwrap();

        assert_eq!(request, FanSpeedRequest::new(vec![50]));
        assert_eq!(serde_json::to_value(&request).unwrap(), json!({ "fans": [50] }));
    }

    #[test]
    fn test_collects_every_error() {
        let errors = validate_fan_request(&json!({ "fans": [5, 50, 200, -1] })).unwrap_err();
        let paths: Vec<&str> = errors.0.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["fans[0]", "fans[2]", "fans[3]"]);
    }

    #[test]
    fn test_abort_early_stops_at_first_error() {
        let errors = validate_fan_request_with(
            &json!({ "fans": [5, 200, -1] }),
            ValidationMode::AbortEarly,
        )
        .unwrap_err();
        assert_eq!(errors.0.len(), 1);
        assert_eq!(errors.0[0].path, "fans[0]");
    }

    #[test]
    fn test_large_arrays() {
        let mut speeds = vec![50; 10_000];
        assert_eq!(fans(json!({ "fans": speeds })).len(), 10_000);

        speeds[9_999] = 999;
        let errors = validate_fan_request(&json!({ "fans": speeds })).unwrap_err();
        assert_eq!(errors.0, vec![FieldError::new("fans[9999]", out_of_range())]);
    }
}
