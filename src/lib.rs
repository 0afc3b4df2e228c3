//! Payment gateway bridge library.
//!
//! Forwards encrypted direct-post payment requests to an out-of-process
//! payment worker over a line-delimited JSON channel, and returns the
//! encrypted result to the browser by redirect or JSONP.

pub mod bridge;
pub mod codec;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod worker;

pub use bridge::{BridgeError, GatewayBridge};
pub use config::schema::BridgeConfig;
pub use http::{DirectPostHandler, HttpServer};
pub use lifecycle::Shutdown;
