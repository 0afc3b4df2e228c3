//! Signed, timestamped tokens.
//!
//! Token layout: `<body>.<timestamp>.<signature>` where `body` is URL-safe
//! base64 JSON, `timestamp` is Unix seconds in decimal and `signature` is
//! URL-safe base64 of `HMAC-SHA256(key, salt ":" body "." timestamp)`.
//!
//! The payload is readable by the browser but cannot be altered or replayed
//! past `max_age` without the key.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::bridge::protocol::Payload;
use crate::codec::{into_object, CodecError, SecureCodec};

type HmacSha256 = Hmac<Sha256>;

// Tolerated clock skew between signer and verifier.
const FUTURE_SKEW_SECS: u64 = 60;

pub struct SignedCodec {
    keyed: HmacSha256,
    salt: String,
    max_age: Option<Duration>,
}

impl SignedCodec {
    pub fn new(key: impl AsRef<[u8]>, salt: impl Into<String>) -> Self {
        Self {
            keyed: HmacSha256::new_from_slice(key.as_ref()).expect("HMAC can take key of any size"),
            salt: salt.into(),
            max_age: None,
        }
    }

    /// Reject tokens older than `max_age`.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    fn mac(&self, body: &str, timestamp: &str) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(self.salt.as_bytes());
        mac.update(b":");
        mac.update(body.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac
    }

    pub(crate) fn encrypt_at(&self, data: &Payload, now: u64) -> Result<String, CodecError> {
        let body = B64.encode(serde_json::to_vec(data)?);
        let timestamp = now.to_string();
        let signature = B64.encode(self.mac(&body, &timestamp).finalize().into_bytes());
        Ok(format!("{}.{}.{}", body, timestamp, signature))
    }

    pub(crate) fn decrypt_at(&self, token: &str, now: u64) -> Result<Payload, CodecError> {
        let mut parts = token.trim().split('.');
        let (body, timestamp, signature) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(b), Some(t), Some(s), None) => (b, t, s),
            _ => return Err(CodecError::Malformed("expected three segments")),
        };

        let signature = B64
            .decode(signature)
            .map_err(|_| CodecError::Malformed("invalid signature encoding"))?;
        self.mac(body, timestamp)
            .verify_slice(&signature)
            .map_err(|_| CodecError::BadSignature)?;

        let issued: u64 = timestamp
            .parse()
            .map_err(|_| CodecError::Malformed("invalid timestamp"))?;
        if issued > now.saturating_add(FUTURE_SKEW_SECS) {
            return Err(CodecError::Malformed("timestamp in the future"));
        }
        if let Some(max_age) = self.max_age {
            let age_secs = now.saturating_sub(issued);
            if age_secs > max_age.as_secs() {
                return Err(CodecError::Expired {
                    age_secs,
                    max_age_secs: max_age.as_secs(),
                });
            }
        }

        let bytes = B64
            .decode(body)
            .map_err(|_| CodecError::Malformed("invalid body encoding"))?;
        into_object(serde_json::from_slice(&bytes)?)
    }
}

impl SecureCodec for SignedCodec {
    fn encrypt(&self, data: &Payload) -> Result<String, CodecError> {
        self.encrypt_at(data, unix_now())
    }

    fn decrypt(&self, token: &str) -> Result<Payload, CodecError> {
        self.decrypt_at(token, unix_now())
    }

    fn name(&self) -> &'static str {
        "signed"
    }
}

impl std::fmt::Debug for SignedCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedCodec")
            .field("salt", &self.salt)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
