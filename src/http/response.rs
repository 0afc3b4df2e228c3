//! Direct-post replies.
//!
//! # Design Decisions
//! - Error bodies are fixed strings; worker output, payload content and
//!   credentials never reach the client
//! - 405 replies advertise the supported methods

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};

pub const MISSING_CALLBACK: &str = "Invalid JSONP request; Please provide 'callback'.";
pub const UNSUPPORTED_METHOD: &str = "Request method must be a POST or JSONP";
pub const PAYMENT_FAILED: &str = "Payment request failed";

/// Outcome of one direct-post request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectPostReply {
    /// POST: send the browser back with the encoded response.
    Redirect { location: String },
    /// GET: `callback({"<field>": "<token>"});`
    Jsonp { callback: String, field: String, token: String },
    MethodNotAllowed(&'static str),
    /// The bridge could not produce a response.
    Failed,
}

impl DirectPostReply {
    pub fn status(&self) -> StatusCode {
        match self {
            DirectPostReply::Redirect { .. } => StatusCode::SEE_OTHER,
            DirectPostReply::Jsonp { .. } => StatusCode::OK,
            DirectPostReply::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            DirectPostReply::Failed => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for DirectPostReply {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            DirectPostReply::Redirect { location } => (
                status,
                [(header::LOCATION, location.clone()), (header::CONTENT_TYPE, "text/html".into())],
                location,
            )
                .into_response(),
            DirectPostReply::Jsonp { callback, field, token } => {
                let mut wrapped = Map::new();
                wrapped.insert(field, Value::String(token));
                let body = format!("{}({});", callback, Value::Object(wrapped));
                (status, [(header::CONTENT_TYPE, "text/javascript")], body).into_response()
            }
            DirectPostReply::MethodNotAllowed(message) => (
                status,
                [(header::ALLOW, "GET, POST"), (header::CONTENT_TYPE, "text/plain")],
                message,
            )
                .into_response(),
            DirectPostReply::Failed => (status, [(header::CONTENT_TYPE, "text/plain")], PAYMENT_FAILED).into_response(),
        }
    }
}

/// `target` with `field=token` appended to its query string.
pub fn redirect_location(target: &str, field: &str, token: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(field, token)
        .finish();
    let separator = match target.find('?') {
        None => "?",
        Some(_) if target.ends_with('?') || target.ends_with('&') => "",
        Some(_) => "&",
    };
    format!("{}{}{}", target, separator, query)
}
