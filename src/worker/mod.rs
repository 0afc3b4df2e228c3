//! Reference worker process.
//!
//! Speaks the bridge's line protocol on stdin/stdout and hosts the `bogus`
//! test gateway. Real processor adapters plug in through [`Gateway`].

pub mod bogus;
pub mod gateway;
pub mod runtime;

pub use bogus::BogusGateway;
pub use gateway::{CreditCard, Gateway, GatewayReply, Operation, WorkerError};
pub use runtime::{build_gateway, WorkerRuntime};
