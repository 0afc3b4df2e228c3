//! Payload codecs for the direct-post endpoint.
//!
//! The browser only ever sees the encoded form of gateway requests and
//! responses. Which algorithm protects that form is a deployment choice, so
//! the handler depends on the [`SecureCodec`] trait and nothing else.
//!
//! - [`PlainCodec`]: base64 JSON. Development and tests only.
//! - [`SignedCodec`]: HMAC-SHA256 over a salted, timestamped token.

pub mod plain;
pub mod signed;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::bridge::protocol::Payload;
use crate::config::{CodecConfig, CodecKind};

pub use plain::PlainCodec;
pub use signed::SignedCodec;

/// Reasons a token could not be produced or accepted.
///
/// Messages never include token or payload content.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed token: {0}")]
    Malformed(&'static str),

    #[error("signature mismatch")]
    BadSignature,

    #[error("token expired ({age_secs}s old, limit {max_age_secs}s)")]
    Expired { age_secs: u64, max_age_secs: u64 },

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload must be a JSON object")]
    NotAnObject,
}

/// Encrypt/decrypt capability for the payload field.
pub trait SecureCodec: Send + Sync {
    fn encrypt(&self, data: &Payload) -> Result<String, CodecError>;

    fn decrypt(&self, token: &str) -> Result<Payload, CodecError>;

    /// Short label for logs.
    fn name(&self) -> &'static str;
}

/// Build the codec selected by `config`.
pub fn build_codec(config: &CodecConfig) -> Arc<dyn SecureCodec> {
    match config.kind {
        CodecKind::Plain => Arc::new(PlainCodec),
        CodecKind::Signed => {
            let codec = SignedCodec::new(config.secret_key.as_bytes(), config.salt.clone());
            match config.max_age_secs {
                Some(secs) => Arc::new(codec.with_max_age(Duration::from_secs(secs))),
                None => Arc::new(codec),
            }
        }
    }
}

fn into_object(value: serde_json::Value) -> Result<Payload, CodecError> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(CodecError::NotAnObject),
    }
}
