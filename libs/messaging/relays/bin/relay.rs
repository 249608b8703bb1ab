//! Chat relay server
//!
//! Usage:
//!   chat_relay
//!   chat_relay --config config/chat_relay.toml
//!   chat_relay --bind 127.0.0.1:4000 --log-level debug

use anyhow::{Context, Result};
use clap::Parser;
use relays::core::{Relay, RelayConfig};
use relays::init_logging;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "chat_relay")]
#[command(about = "Chat relay with checksum and parity verification")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the configured host and port
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level, args.json_logs) {
        eprintln!("{:#}", e);
        std::process::exit(-1);
    }

    let (relay, listener) = match bootstrap(&args).await {
        Ok(started) => started,
        Err(e) => {
            error!("Failed to start relay: {:#}", e);
            std::process::exit(-1);
        }
    };

    // Stop on Ctrl+C
    let shutdown = relay.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
        shutdown.cancel();
    });

    if let Err(e) = relay.run(listener).await {
        error!("Relay failed: {}", e);
        std::process::exit(1);
    }

    match serde_json::to_string(&relay.stats()) {
        Ok(stats) => info!("Final stats: {}", stats),
        Err(e) => error!("Failed to serialize stats: {}", e),
    }
}

async fn bootstrap(args: &Args) -> Result<(Arc<Relay>, TcpListener)> {
    let config = load_config(args)?;

    info!(
        "Configuration: bind {}, queue {} frames, parity {}",
        config.bind_address(),
        config.limits.outbound_queue_capacity,
        if config.validation.enforce_parity {
            "enforced (empty messages rejected)"
        } else {
            "logged only"
        }
    );

    let relay = Arc::new(Relay::new(config));
    let listener = relay.bind().await.context("Failed to bind listener")?;
    Ok((relay, listener))
}

fn load_config(args: &Args) -> Result<RelayConfig> {
    let mut config = RelayConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(bind) = &args.bind {
        let (host, port) = bind
            .rsplit_once(':')
            .with_context(|| format!("--bind expects host:port, got {}", bind))?;
        config.server.host = host.to_string();
        config.server.port = port
            .parse()
            .with_context(|| format!("Invalid port in --bind: {}", port))?;
    }

    config.validate()?;
    Ok(config)
}
