//! Shared utilities for integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use payment_bridge::bridge::{GatewayConfig, Payload};
use payment_bridge::codec::PlainCodec;
use payment_bridge::config::{BridgeConfig, WorkerConfig};
use payment_bridge::http::{DirectPostHandler, HttpServer};
use payment_bridge::lifecycle::Shutdown;

/// The reference worker built alongside the tests.
pub fn bogus_worker() -> WorkerConfig {
    WorkerConfig {
        command: env!("CARGO_BIN_EXE_bogus-worker").into(),
        ..WorkerConfig::default()
    }
}

/// A worker played by a shell script.
pub fn sh_worker(script: &str) -> WorkerConfig {
    WorkerConfig {
        command: "sh".into(),
        args: vec!["-c".into(), script.into()],
        ..WorkerConfig::default()
    }
}

pub fn bogus_gateways() -> Vec<GatewayConfig> {
    vec![GatewayConfig::new("bogus", "test")]
}

pub fn object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {}", other),
    }
}

/// Caller data for a card-based action.
pub fn card_data(number: &str) -> Payload {
    object(json!({
        "cc_number": number,
        "cc_exp_month": "12",
        "cc_exp_year": "2030",
        "cc_ccv": "123",
        "bill_first_name": "Jane",
        "bill_last_name": "Doe",
    }))
}

/// A running bridge server on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub handler: Arc<DirectPostHandler>,
    pub shutdown: Shutdown,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = self.task.await;
    }
}

/// Start the bogus worker behind the plain codec and serve it.
pub async fn start_server() -> TestServer {
    let mut config = BridgeConfig::default();
    config.worker = bogus_worker();
    config.gateways = bogus_gateways();
    config.direct_post.redirect_to = "https://shop.example/return".into();
    start_server_with(config).await
}

pub async fn start_server_with(config: BridgeConfig) -> TestServer {
    let handler = DirectPostHandler::from_source(
        Arc::new(PlainCodec),
        &config,
        &config.worker,
        config.direct_post.clone(),
    )
    .unwrap();
    let handler = Arc::new(handler);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, handler.clone());
    let server_shutdown = shutdown.clone();
    let task = tokio::spawn(async move {
        server.run(listener, server_shutdown).await.unwrap();
    });

    TestServer { addr, handler, shutdown, task }
}

/// Client that leaves redirects for the test to inspect.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
