//! Request-side helpers.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for every request
//! - Decode caller data from a query string or form body
//! - Validate JSONP callback names
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Caller data keeps the first value of repeated keys and drops blanks

use axum::http::{HeaderMap, HeaderValue, Request};
use serde_json::Value;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::bridge::protocol::Payload;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Stamps requests with a random UUID.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Request ID for logging, or "unknown" when absent.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Decode `application/x-www-form-urlencoded` caller data.
pub fn parse_caller_data(raw: &[u8]) -> Payload {
    let mut data = Payload::new();
    for (key, value) in url::form_urlencoded::parse(raw) {
        if value.is_empty() {
            continue;
        }
        data.entry(key.into_owned())
            .or_insert_with(|| Value::String(value.into_owned()));
    }
    data
}

/// JSONP callback names: non-empty, letters, digits, `_`, `$` and `.` only.
pub fn is_valid_callback(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.'))
}
