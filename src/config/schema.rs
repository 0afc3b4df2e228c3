//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge
//! server. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::bridge::channel::ChannelOptions;
use crate::bridge::protocol::GatewayConfig;

/// Root configuration for the payment bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Worker process settings.
    pub worker: WorkerConfig,

    /// Direct-post endpoint settings.
    pub direct_post: DirectPostConfig,

    /// Payload codec settings.
    pub codec: CodecConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Gateways handed to the worker at startup.
    pub gateways: Vec<GatewayConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    /// Must exceed the worker read timeout when one is set.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Worker process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Executable to spawn.
    pub command: String,

    /// Arguments passed to the executable.
    pub args: Vec<String>,

    /// Environment variable carrying the JSON gateway list.
    pub config_env_var: String,

    /// Start the worker with an empty environment.
    pub clear_env: bool,

    /// Response read timeout in seconds. Unset waits indefinitely.
    pub read_timeout_secs: Option<u64>,

    /// Grace period for the worker to exit on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl WorkerConfig {
    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            read_timeout: self.read_timeout_secs.map(Duration::from_secs),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            clear_env: self.clear_env,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: "bogus-worker".to_string(),
            args: Vec::new(),
            config_env_var: "PAYMENT_CONFIGURATION".to_string(),
            clear_env: false,
            read_timeout_secs: None,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Direct-post endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DirectPostConfig {
    /// Route path the handler is mounted on.
    pub endpoint: String,

    /// Fallback redirect target when the payload names none.
    pub redirect_to: String,

    /// Name of the field holding the encrypted payload.
    pub encrypted_field: String,

    /// Maximum accepted request body in bytes.
    pub max_body_size: usize,
}

impl Default for DirectPostConfig {
    fn default() -> Self {
        Self {
            endpoint: "/direct-post/".to_string(),
            redirect_to: "/".to_string(),
            encrypted_field: "payload".to_string(),
            max_body_size: 64 * 1024,
        }
    }
}

/// Codec selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// Base64 JSON, no integrity protection.
    Plain,
    /// HMAC-SHA256 signed, timestamped tokens.
    Signed,
}

/// Payload codec configuration. Defaults to `signed`, which needs a
/// `secret_key`; `plain` must be chosen explicitly.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CodecConfig {
    pub kind: CodecKind,

    /// Signing key for the `signed` codec.
    pub secret_key: String,

    /// Namespaces signatures so tokens from other uses of the key are rejected.
    pub salt: String,

    /// Reject tokens older than this many seconds.
    pub max_age_secs: Option<u64>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            kind: CodecKind::Signed,
            secret_key: String::new(),
            salt: "payment-bridge.direct-post".to_string(),
            max_age_secs: None,
        }
    }
}

impl std::fmt::Debug for CodecConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecConfig")
            .field("kind", &self.kind)
            .field("secret_key", &"<redacted>")
            .field("salt", &self.salt)
            .field("max_age_secs", &self.max_age_secs)
            .finish()
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
