//! Direct-post request lifecycle.
//!
//! # Data Flow
//! ```text
//! GET ?...&callback=cb   POST form body
//!          │                  │
//!          └──── caller data ─┘
//!                   │
//!   codec.decrypt(caller_data[payload])   ── fails ──▶ failed Response
//!                   │
//!   bridge.dispatch(caller_data, decrypted, gateway, action)
//!                   │
//!   codec.encrypt(response)
//!                   │
//!   GET  → 200 text/javascript  cb({"payload": "<token>"});
//!   POST → 303 Location: <redirect>?payload=<token>
//! ```
//!
//! # Design Decisions
//! - Payload problems become ordinary failed responses, encrypted like any other
//! - Transport faults become a generic 502 and never leak details
//! - The handler owns nothing but injected capabilities

use axum::http::Method;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::bridge::{BridgeError, GatewayBridge, Payload, Response};
use crate::codec::{CodecError, SecureCodec};
use crate::config::{ConfigError, DirectPostConfig, GatewaySource, WorkerConfig};
use crate::http::request::{is_valid_callback, parse_caller_data};
use crate::http::response::{redirect_location, DirectPostReply, MISSING_CALLBACK, UNSUPPORTED_METHOD};

pub const MISSING_PAYLOAD_PREFIX: &str = "Missing required field: ";
pub const INVALID_PAYLOAD: &str = "Invalid or expired payload";
pub const MALFORMED_PAYLOAD: &str = "Malformed payload";

/// Failures that prevent any response from reaching the caller.
#[derive(Debug, Error)]
pub enum DirectPostError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("cannot encode response: {0}")]
    Codec(#[from] CodecError),
}

/// Failures while assembling a handler from configuration.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// A processed request: the encoded response and where to send it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub token: String,
    pub redirect: String,
}

pub struct DirectPostHandler {
    codec: Arc<dyn SecureCodec>,
    bridge: Arc<GatewayBridge>,
    config: DirectPostConfig,
}

impl DirectPostHandler {
    pub fn new(codec: Arc<dyn SecureCodec>, bridge: Arc<GatewayBridge>, config: DirectPostConfig) -> Self {
        Self { codec, bridge, config }
    }

    /// Spawn a bridge for the gateways `source` yields.
    pub fn from_source(
        codec: Arc<dyn SecureCodec>,
        source: &dyn GatewaySource,
        worker: &WorkerConfig,
        config: DirectPostConfig,
    ) -> Result<Self, SetupError> {
        let gateways = source.load_gateways()?;
        let bridge = GatewayBridge::spawn(worker, gateways)?;
        Ok(Self::new(codec, Arc::new(bridge), config))
    }

    pub fn bridge(&self) -> &Arc<GatewayBridge> {
        &self.bridge
    }

    pub fn config(&self) -> &DirectPostConfig {
        &self.config
    }

    /// Run one request end to end.
    pub async fn handle(&self, method: &Method, query: Option<&str>, body: &[u8]) -> DirectPostReply {
        if method == Method::GET {
            let caller_data = parse_caller_data(query.unwrap_or_default().as_bytes());
            let callback = match caller_data.get("callback").and_then(Value::as_str) {
                Some(callback) if is_valid_callback(callback) => callback.to_string(),
                _ => return DirectPostReply::MethodNotAllowed(MISSING_CALLBACK),
            };
            match self.process(caller_data).await {
                Ok(processed) => DirectPostReply::Jsonp {
                    callback,
                    field: self.config.encrypted_field.clone(),
                    token: processed.token,
                },
                Err(e) => self.failed(e),
            }
        } else if method == Method::POST {
            match self.process(parse_caller_data(body)).await {
                Ok(processed) => DirectPostReply::Redirect {
                    location: redirect_location(&processed.redirect, &self.config.encrypted_field, &processed.token),
                },
                Err(e) => self.failed(e),
            }
        } else {
            DirectPostReply::MethodNotAllowed(UNSUPPORTED_METHOD)
        }
    }

    /// Decrypt, dispatch and re-encrypt.
    pub async fn process(&self, caller_data: Payload) -> Result<Processed, DirectPostError> {
        let mut redirect = self.config.redirect_to.clone();

        let response = match self.decrypt(&caller_data) {
            Err(failure) => failure,
            Ok(secure_data) => {
                if let Some(target) = secure_data.get("redirect").and_then(Value::as_str) {
                    redirect = target.to_string();
                }
                match dispatch_target(&secure_data) {
                    Err(failure) => failure,
                    Ok((gateway, action)) => {
                        self.bridge
                            .dispatch(Some(caller_data), Some(secure_data), &gateway, action.as_deref())
                            .await?
                    }
                }
            }
        };

        let token = self.codec.encrypt(&response.into_payload())?;
        Ok(Processed { token, redirect })
    }

    fn decrypt(&self, caller_data: &Payload) -> Result<Payload, Response> {
        let field = &self.config.encrypted_field;
        let token = caller_data
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| Response::failure(format!("{}{}", MISSING_PAYLOAD_PREFIX, field)))?;

        self.codec.decrypt(token).map_err(|e| {
            tracing::warn!(codec = self.codec.name(), error = %e, "Rejected payload");
            Response::failure(INVALID_PAYLOAD)
        })
    }

    fn failed(&self, err: DirectPostError) -> DirectPostReply {
        tracing::error!(error = %err, "Direct post failed");
        DirectPostReply::Failed
    }
}

impl std::fmt::Debug for DirectPostHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectPostHandler")
            .field("codec", &self.codec.name())
            .field("bridge", &self.bridge)
            .field("config", &self.config)
            .finish()
    }
}

/// `gateway` must be a string; `action` must be present, string or null.
fn dispatch_target(secure_data: &Payload) -> Result<(String, Option<String>), Response> {
    let gateway = match secure_data.get("gateway") {
        Some(Value::String(gateway)) => gateway.clone(),
        _ => return Err(Response::failure(MALFORMED_PAYLOAD)),
    };
    let action = match secure_data.get("action") {
        Some(Value::String(action)) => Some(action.clone()),
        Some(Value::Null) => None,
        _ => return Err(Response::failure(MALFORMED_PAYLOAD)),
    };
    Ok((gateway, action))
}
