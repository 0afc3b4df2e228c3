//! Reference payment worker.
//!
//! Reads one JSON request per line on stdin and writes one JSON response per
//! line on stdout. Gateways come from the JSON list in the configuration
//! environment variable. Logs go to stderr.

use clap::Parser;
use std::io;

use payment_bridge::observability::logging::init_worker_logging;
use payment_bridge::worker::WorkerRuntime;

#[derive(Parser)]
#[command(name = "bogus-worker")]
#[command(about = "Payment worker hosting the bogus test gateway", long_about = None)]
struct Cli {
    /// Environment variable holding the gateway list.
    #[arg(long, default_value = "PAYMENT_CONFIGURATION")]
    config_env: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_worker_logging();

    let mut runtime = WorkerRuntime::from_env(&cli.config_env)?;
    tracing::info!(gateways = ?runtime.gateway_names(), "Worker ready");

    let stdin = io::stdin();
    let stdout = io::stdout();
    runtime.run(stdin.lock(), stdout.lock())?;
    Ok(())
}
