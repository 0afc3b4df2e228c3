//! Gateway bridge: the public dispatch surface.
//!
//! # Responsibilities
//! - Hand the gateway list to a freshly spawned worker
//! - Build, send and verify one request per `dispatch`
//! - Invalidate itself on the first transport fault
//! - Orderly shutdown

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use crate::bridge::channel::{ChannelStatus, ProcessChannel};
use crate::bridge::correlator::RequestCorrelator;
use crate::bridge::error::{BridgeError, BridgeResult};
use crate::bridge::protocol::{GatewayConfig, Payload, Request, Response};
use crate::config::WorkerConfig;
use crate::observability::metrics;

/// Bridge lifecycle.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Running = 0,
    /// A transport fault occurred; the worker was killed.
    Faulted = 1,
    Closed = 2,
}

impl From<u8> for BridgeState {
    fn from(val: u8) -> Self {
        match val {
            0 => BridgeState::Running,
            1 => BridgeState::Faulted,
            _ => BridgeState::Closed,
        }
    }
}

/// Owns the worker process and serializes all gateway calls through it.
#[derive(Debug)]
pub struct GatewayBridge {
    channel: ProcessChannel,
    correlator: RequestCorrelator,
    gateways: Vec<GatewayConfig>,
    state: AtomicU8,
}

impl GatewayBridge {
    /// Spawn the worker described by `worker`, configured with `gateways`.
    pub fn spawn(worker: &WorkerConfig, gateways: Vec<GatewayConfig>) -> BridgeResult<Self> {
        Self::spawn_with_correlator(worker, gateways, RequestCorrelator::default())
    }

    /// Like [`GatewayBridge::spawn`] with an explicit identifier source.
    pub fn spawn_with_correlator(
        worker: &WorkerConfig,
        gateways: Vec<GatewayConfig>,
        correlator: RequestCorrelator,
    ) -> BridgeResult<Self> {
        check_gateways(&gateways)?;

        let serialized = serde_json::to_string(&gateways)
            .map_err(|e| BridgeError::Construction(format!("cannot serialize gateways: {}", e)))?;
        let env = vec![(worker.config_env_var.clone(), serialized)];

        let channel = ProcessChannel::open(&worker.command, &worker.args, &env, worker.channel_options())?;

        tracing::info!(
            program = %worker.command,
            gateways = ?gateways.iter().map(|g| g.name.as_str()).collect::<Vec<_>>(),
            "Gateway bridge ready"
        );

        Ok(Self {
            channel,
            correlator,
            gateways,
            state: AtomicU8::new(BridgeState::Running as u8),
        })
    }

    /// Run `action` against `gateway` and wait for the worker's answer.
    ///
    /// `action = None` asks for the gateway's supported actions instead.
    /// Gateway declines come back as `Ok` with `success == false`; only
    /// transport faults and a closed bridge are errors.
    pub async fn dispatch(
        &self,
        data: Option<Payload>,
        secure_data: Option<Payload>,
        gateway: &str,
        action: Option<&str>,
    ) -> BridgeResult<Response> {
        if self.state() != BridgeState::Running {
            return Err(BridgeError::BridgeClosed);
        }

        let start = Instant::now();
        let request = Request {
            request_id: self.correlator.generate_id(),
            data,
            secure_data,
            gateway: gateway.to_string(),
            action: action.map(str::to_string),
        };
        let action_label = action.unwrap_or("discover");

        let result = self.round_trip(&request).await;

        match &result {
            Ok(response) => {
                tracing::debug!(
                    request_id = request.request_id,
                    gateway = %gateway,
                    action = %action_label,
                    success = response.success,
                    "Dispatch complete"
                );
                let outcome = if request.is_discovery() {
                    "discovery"
                } else if response.success {
                    "success"
                } else {
                    "failure"
                };
                metrics::record_dispatch(gateway, action_label, outcome, start);
            }
            Err(err) => {
                if err.is_transport_fault() {
                    metrics::record_transport_fault(err.kind());
                    self.fault(request.request_id, err).await;
                }
                metrics::record_dispatch(gateway, action_label, "error", start);
            }
        }

        result
    }

    /// Actions `gateway` supports. Has no side effects on the gateway.
    pub async fn supported_actions(&self, gateway: &str) -> BridgeResult<BTreeSet<String>> {
        let response = self.dispatch(None, None, gateway, None).await?;
        Ok(response.supported_actions.unwrap_or_default())
    }

    /// Close the worker. Safe to call more than once.
    pub async fn shutdown(&self) -> BridgeResult<()> {
        let previous = BridgeState::from(self.state.swap(BridgeState::Closed as u8, Ordering::SeqCst));
        if previous == BridgeState::Closed {
            return Ok(());
        }
        tracing::info!(exchanges = self.channel.exchanges(), "Shutting down gateway bridge");
        self.channel.close().await
    }

    pub fn state(&self) -> BridgeState {
        BridgeState::from(self.state.load(Ordering::SeqCst))
    }

    /// True while dispatches can still reach the worker.
    pub fn is_usable(&self) -> bool {
        self.state() == BridgeState::Running && self.channel.status() == ChannelStatus::Running
    }

    pub fn gateways(&self) -> &[GatewayConfig] {
        &self.gateways
    }

    /// Completed worker round trips.
    pub fn exchanges(&self) -> u64 {
        self.channel.exchanges()
    }

    pub fn worker_pid(&self) -> Option<u32> {
        self.channel.pid()
    }

    async fn round_trip(&self, request: &Request) -> BridgeResult<Response> {
        let line = serde_json::to_string(request)
            .map_err(|e| BridgeError::Protocol(format!("cannot encode request: {}", e)))?;

        let reply = self.channel.exchange(&line).await?;

        // The raw line may carry card data; only the parser error is reported.
        let response: Response = serde_json::from_str(&reply)
            .map_err(|e| BridgeError::Protocol(format!("malformed response line: {}", e)))?;

        self.correlator.verify(request.request_id, response)
    }

    async fn fault(&self, request_id: u32, err: &BridgeError) {
        let transitioned = self
            .state
            .compare_exchange(
                BridgeState::Running as u8,
                BridgeState::Faulted as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if transitioned {
            tracing::error!(
                request_id,
                error = %err,
                kind = err.kind(),
                "Transport fault, bridge is no longer usable"
            );
            self.channel.terminate().await;
        }
    }
}

fn check_gateways(gateways: &[GatewayConfig]) -> BridgeResult<()> {
    if gateways.is_empty() {
        return Err(BridgeError::Construction("no gateways configured".into()));
    }
    let mut seen = HashSet::new();
    for gateway in gateways {
        if gateway.name.is_empty() || gateway.module.is_empty() {
            return Err(BridgeError::Construction(
                "gateway name and module must not be empty".into(),
            ));
        }
        if !seen.insert(gateway.name.as_str()) {
            return Err(BridgeError::Construction(format!(
                "duplicate gateway name '{}'",
                gateway.name
            )));
        }
    }
    Ok(())
}
