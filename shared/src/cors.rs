//! Simplified CORS handling for the HTTP edge.
//!
//! Detects whether a request is cross-origin or a preflight based on its
//! characteristic headers, and fills in the corresponding response headers.
//! A detected preflight needs no further processing by the caller.

use http::Method;
use http::header::{HeaderMap, HeaderValue, HOST, ORIGIN};
use hyper::Request;

const ACCESS_CONTROL_REQUEST_METHOD: &str = "access-control-request-method";
const ACCESS_CONTROL_REQUEST_HEADERS: &str = "access-control-request-headers";
const ACCESS_CONTROL_ALLOW_ORIGIN: &str = "access-control-allow-origin";
const ACCESS_CONTROL_ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
const ACCESS_CONTROL_ALLOW_METHODS: &str = "access-control-allow-methods";
const ACCESS_CONTROL_ALLOW_HEADERS: &str = "access-control-allow-headers";
const ACCESS_CONTROL_MAX_AGE: &str = "access-control-max-age";

/// Seconds a preflight result may be cached by the client.
const PREFLIGHT_MAX_AGE_SECS: u64 = 86400;

/// Adds CORS response headers for cross-origin requests.
///
/// Returns `true` when the request is a preflight, in which case the caller
/// should respond immediately with the collected headers and no body.
pub fn enable_cors<B>(request: &Request<B>, response_headers: &mut HeaderMap) -> bool {
    let mut is_preflight = false;

    let Some(origin) = header_str(request.headers(), ORIGIN.as_str()) else {
        return is_preflight;
    };

    let host = header_str(request.headers(), HOST.as_str())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()));

    // Same-origin requests need no CORS headers
    if let Some(host) = host
        && origin.to_ascii_lowercase().ends_with(&format!("//{}", host.to_ascii_lowercase()))
    {
        return is_preflight;
    }

    if let Ok(value) = HeaderValue::from_str(origin) {
        response_headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    response_headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );

    if request.method() == Method::OPTIONS {
        if let Some(cors_method) = request.headers().get(ACCESS_CONTROL_REQUEST_METHOD) {
            response_headers.insert(ACCESS_CONTROL_ALLOW_METHODS, cors_method.clone());
            response_headers.insert(
                ACCESS_CONTROL_MAX_AGE,
                HeaderValue::from_str(&PREFLIGHT_MAX_AGE_SECS.to_string()).unwrap(),
            );
            is_preflight = true;
        }

        if let Some(cors_headers) = request.headers().get(ACCESS_CONTROL_REQUEST_HEADERS) {
            response_headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, cors_headers.clone());
        }
    }

    is_preflight
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
