//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Cross-field checks (request timeout vs. worker read timeout)
//! - Gateway list integrity (non-empty, unique names)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{BridgeConfig, CodecKind};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check `config` and report every problem found.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() || tls.key_path.is_empty() {
            errors.push(ValidationError::new("listener.tls", "cert_path and key_path are required"));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let worker = &config.worker;
    if worker.command.trim().is_empty() {
        errors.push(ValidationError::new("worker.command", "must not be empty"));
    }
    if worker.config_env_var.is_empty() || worker.config_env_var.contains('=') {
        errors.push(ValidationError::new(
            "worker.config_env_var",
            "must be a non-empty variable name without '='",
        ));
    }
    if worker.shutdown_timeout_secs == 0 {
        errors.push(ValidationError::new("worker.shutdown_timeout_secs", "must be greater than 0"));
    }
    match worker.read_timeout_secs {
        Some(0) => errors.push(ValidationError::new(
            "worker.read_timeout_secs",
            "must be greater than 0 when set",
        )),
        // A request abandoned mid-read would desynchronise the channel.
        Some(read) if read >= config.timeouts.request_secs => errors.push(ValidationError::new(
            "timeouts.request_secs",
            format!("must exceed worker.read_timeout_secs ({})", read),
        )),
        _ => {}
    }

    let direct_post = &config.direct_post;
    if !direct_post.endpoint.starts_with('/') {
        errors.push(ValidationError::new("direct_post.endpoint", "must start with '/'"));
    }
    if direct_post.redirect_to.is_empty() {
        errors.push(ValidationError::new("direct_post.redirect_to", "must not be empty"));
    }
    if direct_post.encrypted_field.is_empty() {
        errors.push(ValidationError::new("direct_post.encrypted_field", "must not be empty"));
    }
    if direct_post.max_body_size == 0 {
        errors.push(ValidationError::new("direct_post.max_body_size", "must be greater than 0"));
    }

    if config.codec.kind == CodecKind::Signed && config.codec.secret_key.is_empty() {
        errors.push(ValidationError::new("codec.secret_key", "required for the signed codec"));
    }
    if config.codec.max_age_secs == Some(0) {
        errors.push(ValidationError::new("codec.max_age_secs", "must be greater than 0 when set"));
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", observability.log_level),
        ));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if config.gateways.is_empty() {
        errors.push(ValidationError::new("gateways", "at least one gateway is required"));
    }
    let mut names = HashSet::new();
    for (i, gateway) in config.gateways.iter().enumerate() {
        if gateway.module.is_empty() {
            errors.push(ValidationError::new(format!("gateways[{}].module", i), "must not be empty"));
        }
        if gateway.name.is_empty() {
            errors.push(ValidationError::new(format!("gateways[{}].name", i), "must not be empty"));
        } else if !names.insert(gateway.name.as_str()) {
            errors.push(ValidationError::new(
                format!("gateways[{}].name", i),
                format!("duplicate gateway name '{}'", gateway.name),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
