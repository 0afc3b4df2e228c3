//! Bridge to the payment worker process.
//!
//! # Data Flow
//! ```text
//! GatewayBridge::dispatch(data, secure_data, gateway, action)
//!     → correlator.rs (stamp fresh request_id)
//!     → protocol.rs (serialize Request as one JSON line)
//!     → channel.rs (lock, write line, read one line, unlock)
//!     → protocol.rs (parse Response)
//!     → correlator.rs (request_id must match)
//!     → Response
//! ```
//!
//! # Design Decisions
//! - One worker, one exchange in flight; callers queue on a fair mutex
//! - Any transport fault kills the worker and retires the bridge
//! - Gateway declines are data (`success: false`), not errors
//! - Scaling means more bridges, not pipelining

pub mod channel;
pub mod correlator;
pub mod error;
pub mod gateway;
pub mod protocol;

pub use channel::{ChannelOptions, ChannelStatus, ProcessChannel};
pub use correlator::{IdGenerator, RandomIds, RequestCorrelator, SequentialIds};
pub use error::{BridgeError, BridgeResult};
pub use gateway::{BridgeState, GatewayBridge};
pub use protocol::{Action, GatewayConfig, Payload, Request, Response};
