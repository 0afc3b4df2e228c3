//! Failure injection tests for the gateway bridge.
//!
//! Misbehaving workers are played by small shell scripts.

#![cfg(unix)]

use std::time::{Duration, Instant};

use payment_bridge::bridge::{
    BridgeError, BridgeState, GatewayBridge, RequestCorrelator, SequentialIds,
};

mod common;

fn spawn(script: &str) -> GatewayBridge {
    GatewayBridge::spawn(&common::sh_worker(script), common::bogus_gateways()).unwrap()
}

async fn discover(bridge: &GatewayBridge) -> Result<(), BridgeError> {
    bridge.dispatch(None, None, "test", None).await.map(|_| ())
}

#[tokio::test]
async fn test_worker_exit_closes_bridge() {
    let bridge = spawn("read line; exit 3");

    let err = discover(&bridge).await.unwrap_err();
    assert!(matches!(err, BridgeError::WorkerTerminated(_)), "got {:?}", err);
    assert_eq!(bridge.state(), BridgeState::Faulted);
    assert!(!bridge.is_usable());

    let err = discover(&bridge).await.unwrap_err();
    assert!(matches!(err, BridgeError::BridgeClosed), "got {:?}", err);

    // Shutting down a faulted bridge still succeeds.
    bridge.shutdown().await.unwrap();
    assert_eq!(bridge.state(), BridgeState::Closed);
}

#[tokio::test]
async fn test_garbage_output_is_protocol_error() {
    let bridge = spawn("while read line; do echo 'not json at all'; done");

    let err = discover(&bridge).await.unwrap_err();
    assert!(matches!(err, BridgeError::Protocol(_)), "got {:?}", err);
    assert!(!err.to_string().contains("not json at all"));
    assert_eq!(bridge.state(), BridgeState::Faulted);
}

#[tokio::test]
async fn test_stale_response_is_correlation_mismatch() {
    let worker = common::sh_worker(
        r#"while read line; do echo '{"request_id": 7, "success": true, "message": ""}'; done"#,
    );
    let correlator = RequestCorrelator::new(SequentialIds::starting_at(100));
    let bridge = GatewayBridge::spawn_with_correlator(&worker, common::bogus_gateways(), correlator).unwrap();

    let err = discover(&bridge).await.unwrap_err();
    match err {
        BridgeError::CorrelationMismatch { expected, actual } => {
            assert_eq!(expected, 100);
            assert_eq!(actual, 7);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(matches!(discover(&bridge).await, Err(BridgeError::BridgeClosed)));
}

#[tokio::test]
async fn test_hung_worker_times_out_and_is_killed() {
    let mut worker = common::sh_worker("while read line; do sleep 30; done");
    worker.read_timeout_secs = Some(1);
    let bridge = GatewayBridge::spawn(&worker, common::bogus_gateways()).unwrap();

    let start = Instant::now();
    let err = discover(&bridge).await.unwrap_err();
    assert!(matches!(err, BridgeError::WorkerUnresponsive(_)), "got {:?}", err);
    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(!bridge.is_usable());
}

#[tokio::test]
async fn test_missing_executable_fails_spawn() {
    let mut worker = common::bogus_worker();
    worker.command = "/nonexistent/payment-worker".into();
    let err = GatewayBridge::spawn(&worker, common::bogus_gateways()).unwrap_err();
    assert!(matches!(err, BridgeError::Spawn { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let bridge = GatewayBridge::spawn(&common::bogus_worker(), common::bogus_gateways()).unwrap();
    bridge.shutdown().await.unwrap();
    bridge.shutdown().await.unwrap();
    assert!(matches!(discover(&bridge).await, Err(BridgeError::BridgeClosed)));
    assert_ne!(bridge.state(), BridgeState::Running);
}

#[tokio::test]
async fn test_abandoned_dispatch_keeps_bridge_usable() {
    // Echoes each request back after a delay; an echoed request parses as a
    // response with the same id.
    let bridge = spawn(r#"while read line; do sleep 1; echo "$line"; done"#);

    let abandoned = tokio::time::timeout(Duration::from_millis(200), discover(&bridge)).await;
    assert!(abandoned.is_err());

    let response = bridge.dispatch(None, None, "test", Some("void")).await.unwrap();
    assert_eq!(response.field_str("action"), Some("void"));
    assert_eq!(bridge.state(), BridgeState::Running);
    assert!(bridge.is_usable());
    assert_eq!(bridge.exchanges(), 2);
}
