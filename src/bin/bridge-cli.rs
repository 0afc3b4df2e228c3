use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

use payment_bridge::bridge::{GatewayBridge, Payload};
use payment_bridge::codec::build_codec;
use payment_bridge::config::load_config;

#[derive(Parser)]
#[command(name = "bridge-cli")]
#[command(about = "Operator CLI for the payment bridge", long_about = None)]
struct Cli {
    /// Bridge configuration used to spawn a worker.
    #[arg(short, long, env = "PAYMENT_BRIDGE_CONFIG", default_value = "payment-bridge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the actions a gateway supports
    Actions {
        gateway: String,
    },
    /// Run a single operation against a freshly spawned worker
    Dispatch {
        gateway: String,
        action: String,
        /// Caller data as a JSON object
        #[arg(long, default_value = "{}")]
        data: String,
        /// Secure data as a JSON object
        #[arg(long, default_value = "{}")]
        secure: String,
    },
    /// Send a JSONP request to a running bridge and decode the reply
    Jsonp {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
        gateway: String,
        action: String,
        /// Secure data as a JSON object
        #[arg(long, default_value = "{}")]
        secure: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Actions { gateway } => {
            let bridge = GatewayBridge::spawn(&config.worker, config.gateways.clone())?;
            let result = bridge.supported_actions(&gateway).await;
            bridge.shutdown().await?;
            println!("{}", serde_json::to_string_pretty(&result?)?);
        }
        Commands::Dispatch { gateway, action, data, secure } => {
            let bridge = GatewayBridge::spawn(&config.worker, config.gateways.clone())?;
            let result = bridge
                .dispatch(Some(object(&data)?), Some(object(&secure)?), &gateway, Some(action.as_str()))
                .await;
            bridge.shutdown().await?;
            println!("{}", serde_json::to_string_pretty(&result?)?);
        }
        Commands::Jsonp { url, gateway, action, secure } => {
            let codec = build_codec(&config.codec);
            let mut secure = object(&secure)?;
            secure.insert("gateway".into(), Value::String(gateway));
            secure.insert("action".into(), Value::String(action));
            let field = &config.direct_post.encrypted_field;

            let res = reqwest::Client::new()
                .get(format!("{}{}", url.trim_end_matches('/'), config.direct_post.endpoint))
                .query(&[(field.as_str(), codec.encrypt(&secure)?.as_str()), ("callback", "cb")])
                .send()
                .await?;

            let status = res.status();
            let body = res.text().await?;
            if !status.is_success() {
                eprintln!("Error: bridge returned status {}", status);
                eprintln!("Response: {}", body);
                return Ok(());
            }

            let inner = body
                .trim()
                .strip_prefix("cb(")
                .and_then(|s| s.strip_suffix(");"))
                .ok_or("reply is not a JSONP call")?;
            let envelope: Payload = serde_json::from_str(inner)?;
            let token = envelope
                .get(field)
                .and_then(Value::as_str)
                .ok_or("reply has no encrypted field")?;
            println!("{}", serde_json::to_string_pretty(&codec.decrypt(token)?)?);
        }
    }

    Ok(())
}

fn object(json: &str) -> Result<Payload, Box<dyn std::error::Error + Send + Sync>> {
    match serde_json::from_str(json)? {
        Value::Object(map) => Ok(map),
        _ => Err("expected a JSON object".into()),
    }
}
