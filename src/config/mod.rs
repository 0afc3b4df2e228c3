//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BridgeConfig (validated, immutable)
//!     → source.rs hands the gateway list to the bridge
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//!   (the worker receives its gateways only at spawn time)
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod source;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BridgeConfig, CodecConfig, CodecKind, DirectPostConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, TimeoutConfig, TlsConfig, WorkerConfig,
};
pub use source::{GatewaySource, JsonFileGateways};
pub use validation::{validate_config, ValidationError};
