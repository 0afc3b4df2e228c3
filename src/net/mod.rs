//! Network layer subsystem.
//!
//! TLS is optional; when configured the listener terminates it with rustls
//! via `axum-server`, otherwise a plain Tokio listener is used.

pub mod tls;

pub use tls::load_tls_config;
