//! Same-origin check for state-changing requests
//!
//! The origin a browser declares (`Origin`, or failing that the origin of
//! `Referer`) must equal the origin this service is reached at. Behind a
//! reverse proxy the latter comes from `X-Forwarded-Proto` / `X-Forwarded-Host`;
//! otherwise from the listener's TLS state and `Host`.

use axum::http::{HeaderMap, header};
use url::Url;

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Whether the request declares the origin it is being served from
pub fn validate(headers: &HeaderMap, connection_encrypted: bool) -> bool {
    match (
        request_origin(headers),
        expected_origin(headers, connection_encrypted),
    ) {
        (Some(declared), Some(expected)) => declared == expected,
        _ => false,
    }
}

/// Origin declared by the client
///
/// A `Referer` that does not parse, or whose origin is opaque, yields `None`.
pub fn request_origin(headers: &HeaderMap) -> Option<String> {
    if let Some(origin) = header_value(headers, header::ORIGIN.as_str()) {
        return Some(origin.to_string());
    }

    let referer = header_value(headers, header::REFERER.as_str())?;
    let origin = Url::parse(referer).ok()?.origin();
    origin
        .is_tuple()
        .then(|| origin.ascii_serialization())
}

/// Origin this request was addressed to, as `scheme://host[:port]`
pub fn expected_origin(headers: &HeaderMap, connection_encrypted: bool) -> Option<String> {
    let scheme = match first_forwarded_value(headers, X_FORWARDED_PROTO) {
        Some(proto) => proto.to_string(),
        None if connection_encrypted => "https".to_string(),
        None => "http".to_string(),
    };

    let host = first_forwarded_value(headers, X_FORWARDED_HOST)
        .or_else(|| header_value(headers, header::HOST.as_str()))?;

    if scheme.is_empty() || host.is_empty() {
        return None;
    }
    Some(format!("{}://{}", scheme, host))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

/// First entry of a comma-separated forwarding header; proxies chain them
///
/// A present header whose first entry is blank yields `Some("")` so the
/// request fails the check instead of falling back to the direct connection.
fn first_forwarded_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    header_value(headers, name)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
}
