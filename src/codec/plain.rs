//! Unprotected codec: URL-safe base64 of the JSON object.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64, Engine as _};

use crate::bridge::protocol::Payload;
use crate::codec::{into_object, CodecError, SecureCodec};

/// Anyone can read and forge these tokens. Never use in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCodec;

impl SecureCodec for PlainCodec {
    fn encrypt(&self, data: &Payload) -> Result<String, CodecError> {
        Ok(B64.encode(serde_json::to_vec(data)?))
    }

    fn decrypt(&self, token: &str) -> Result<Payload, CodecError> {
        let bytes = B64
            .decode(token.trim())
            .map_err(|_| CodecError::Malformed("invalid base64"))?;
        into_object(serde_json::from_slice(&bytes)?)
    }

    fn name(&self) -> &'static str {
        "plain"
    }
}
