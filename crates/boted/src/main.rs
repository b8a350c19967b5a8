//! boted - bote relay node
//!
//! Brings up a datagram session through the local I2P router, relays
//! onion-style relay requests and logs everything else it receives.

use boted::config::Config;
use boted::node::Node;
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging(config: &Config) {
    let level = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("boted={}", level).parse().unwrap())
        .add_directive(format!("bote_net={}", level).parse().unwrap());

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration
    let config = Config::parse();
    init_logging(&config);

    info!("boted v{} - bote relay node", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    let node = match Node::start(config).await {
        Ok(node) => node,
        Err(e) => {
            error!("Failed to start node: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (mut inbound, receiver) = node.spawn_receiver();
    info!("Node started as {} (press Ctrl+C to exit)", node.local_addr().short());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            msg = inbound.recv() => match msg {
                Some(msg) => info!(
                    "{} from {}",
                    msg.message.packet_type(),
                    msg.from.short()
                ),
                None => {
                    warn!("Receive loop ended");
                    break;
                }
            },
        }
    }

    receiver.abort();
    info!("Shutting down...");

    match node.shutdown().await {
        Ok(stats) => info!(
            "Final stats: {} relay requests processed, {} forwarded, {} delivered, {} dropped",
            stats.requests_processed,
            stats.requests_forwarded,
            stats.requests_delivered,
            stats.requests_dropped
        ),
        Err(e) => {
            error!("Shutdown failed: {}", e);
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
