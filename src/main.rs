//! Payment bridge server.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                PAYMENT BRIDGE                │
//!                        │                                              │
//!   Browser POST / JSONP │  ┌─────────┐    ┌─────────────┐    ┌───────┐ │
//!   ─────────────────────┼─▶│  http   │───▶│ direct_post │───▶│ codec │ │
//!                        │  │ server  │    │   handler   │    └───────┘ │
//!                        │  └─────────┘    └──────┬──────┘              │
//!                        │                        │                     │
//!                        │                        ▼                     │
//!                        │                 ┌─────────────┐  stdin/out   │  ┌────────┐
//!                        │                 │   bridge    │◀─────────────┼─▶│ worker │
//!                        │                 │  (channel)  │  JSON lines  │  └────────┘
//!                        │                 └─────────────┘              │
//!   303 / JSONP          │                                              │
//!   ◀────────────────────┼── encrypted response                        │
//!                        │                                              │
//!                        │  config · observability · lifecycle · net    │
//!                        └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use payment_bridge::codec::build_codec;
use payment_bridge::config::{load_config, CodecKind};
use payment_bridge::http::{DirectPostHandler, HttpServer};
use payment_bridge::lifecycle::{wait_for_signal, Shutdown};
use payment_bridge::net::load_tls_config;
use payment_bridge::observability::{init_logging, init_metrics};

#[derive(Parser)]
#[command(name = "payment-bridge")]
#[command(about = "Direct-post payment bridge", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "PAYMENT_BRIDGE_CONFIG", default_value = "payment-bridge.toml")]
    config: PathBuf,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "payment-bridge starting");
    tracing::info!(
        config = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        endpoint = %config.direct_post.endpoint,
        codec = ?config.codec.kind,
        gateways = config.gateways.len(),
        worker = %config.worker.command,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        init_metrics(addr);
    }

    if config.codec.kind == CodecKind::Plain {
        tracing::warn!("Plain codec selected: payloads are not authenticated and can be forged by clients");
    }
    let codec = build_codec(&config.codec);
    let handler = DirectPostHandler::from_source(codec, &config, &config.worker, config.direct_post.clone())?;
    tracing::info!(pid = ?handler.bridge().worker_pid(), "Worker started");
    let handler = Arc::new(handler);

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.trigger();
    });

    let tls = config.listener.tls.clone();
    let server = HttpServer::new(config, handler);

    match tls {
        Some(tls) => {
            let addr: SocketAddr = server.config().listener.bind_address.parse()?;
            let rustls = load_tls_config(&tls).await?;
            server.run_tls(addr, rustls, shutdown).await?;
        }
        None => {
            let listener = TcpListener::bind(&server.config().listener.bind_address).await?;
            server.run(listener, shutdown).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
