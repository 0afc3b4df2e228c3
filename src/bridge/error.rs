//! Bridge error taxonomy.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the process channel and the gateway bridge.
///
/// Every variant except `Construction` and `BridgeClosed` is a transport
/// fault: the worker relationship is broken and the bridge is unusable.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The worker executable could not be launched.
    #[error("failed to spawn worker '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The bridge could not be assembled (bad gateway list, serialization).
    #[error("bridge construction failed: {0}")]
    Construction(String),

    /// The worker exited or closed its pipes.
    #[error("worker terminated{}", .0.as_ref().map(|s| format!(" ({})", s)).unwrap_or_default())]
    WorkerTerminated(Option<String>),

    /// No response line arrived within the configured read timeout.
    #[error("worker did not respond within {0:?}")]
    WorkerUnresponsive(Duration),

    /// A line could not be framed or decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The response belongs to a different request.
    #[error("correlation mismatch: expected request {expected}, got {actual}")]
    CorrelationMismatch { expected: u32, actual: u32 },

    /// The bridge was shut down or invalidated by an earlier fault.
    #[error("bridge is closed")]
    BridgeClosed,

    /// Unexpected I/O failure on the worker pipes.
    #[error("worker I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// True when the bridge must be treated as unusable after this error.
    pub fn is_transport_fault(&self) -> bool {
        matches!(
            self,
            BridgeError::Spawn { .. }
                | BridgeError::WorkerTerminated(_)
                | BridgeError::WorkerUnresponsive(_)
                | BridgeError::Protocol(_)
                | BridgeError::CorrelationMismatch { .. }
                | BridgeError::Io(_)
        )
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Spawn { .. } => "spawn",
            BridgeError::Construction(_) => "construction",
            BridgeError::WorkerTerminated(_) => "worker_terminated",
            BridgeError::WorkerUnresponsive(_) => "worker_unresponsive",
            BridgeError::Protocol(_) => "protocol",
            BridgeError::CorrelationMismatch { .. } => "correlation_mismatch",
            BridgeError::BridgeClosed => "bridge_closed",
            BridgeError::Io(_) => "io",
        }
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
