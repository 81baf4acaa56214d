//! Inbound request inspection.
//!
//! Everything here reads headers only; bodies are never touched.

use axum::extract::MatchedPath;
use axum::http::{HeaderMap, Request};
use serde_json::{Map, Value};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Route label for requests that matched no route.
pub const UNMATCHED_ROUTE: &str = "unmatched";

const REDACTED: &str = "[REDACTED]";

const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
];

/// Header map as JSON with credential values replaced.
///
/// Repeated headers are joined with `", "`. Values that are not valid UTF-8
/// are skipped.
pub fn sanitize_headers(headers: &HeaderMap) -> Value {
    let mut out = Map::new();
    for (name, value) in headers {
        let key = name.as_str();
        let rendered = if SENSITIVE_HEADERS.contains(&key) {
            REDACTED.to_string()
        } else {
            match value.to_str() {
                Ok(v) => v.to_string(),
                Err(_) => continue,
            }
        };
        match out.get_mut(key) {
            Some(Value::String(existing)) if rendered != REDACTED => {
                existing.push_str(", ");
                existing.push_str(&rendered);
            }
            Some(_) => {}
            None => {
                out.insert(key.to_string(), Value::String(rendered));
            }
        }
    }
    Value::Object(out)
}

pub fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok())
}

/// Matched route template, e.g. `/call-frontend/{*endpoint}`.
pub fn route_label<B>(request: &Request<B>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string())
}
