//! Configuration for boted

use bote_net::SamConfig;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// boted - bote relay node
#[derive(Parser, Debug, Clone)]
#[command(name = "boted")]
#[command(about = "bote relay node over a local I2P router")]
pub struct Config {
    /// SAM control address of the I2P router
    #[arg(long, env = "BOTE_SAM_ADDR", default_value = "127.0.0.1:7656")]
    pub sam: String,

    /// Router datagram forwarding endpoint (default: control port - 1)
    #[arg(long)]
    pub sam_udp: Option<SocketAddr>,

    /// Destination keyfile, generated on first start
    #[arg(short, long, default_value = "./data/boted/destination.keys")]
    pub keyfile: PathBuf,

    /// SAM session name
    #[arg(long, default_value = "boted")]
    pub session_name: String,

    /// Lowest acceptable SAM version
    #[arg(long, default_value = "3.0")]
    pub min_version: String,

    /// Highest acceptable SAM version
    #[arg(long, default_value = "3.0")]
    pub max_version: String,

    /// Forward relay requests for other peers
    #[arg(long)]
    pub relay: bool,

    /// Longest relay delay accepted, in seconds
    #[arg(long, default_value = "3600")]
    pub max_relay_delay_secs: u64,

    /// Relay forwards that may wait for their delay at once
    #[arg(long, default_value = "1024")]
    pub max_pending_forwards: usize,

    /// Control-protocol timeout in seconds (0 = none)
    #[arg(long, default_value = "30")]
    pub timeout_secs: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.session_name.is_empty() {
            anyhow::bail!("Session name cannot be empty");
        }
        if self.session_name.chars().any(char::is_whitespace) {
            anyhow::bail!("Session name cannot contain whitespace");
        }
        if self.min_version.is_empty() || self.max_version.is_empty() {
            anyhow::bail!("SAM versions cannot be empty");
        }
        if self.keyfile.as_os_str().is_empty() {
            anyhow::bail!("Keyfile path cannot be empty");
        }
        if self.max_pending_forwards == 0 {
            anyhow::bail!("Max pending forwards must be at least 1");
        }
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            anyhow::bail!("Unknown log format: {}", self.log_format);
        }
        Ok(())
    }

    pub fn max_relay_delay(&self) -> Duration {
        Duration::from_secs(self.max_relay_delay_secs)
    }

    /// Router connection settings
    pub fn sam_config(&self) -> SamConfig {
        SamConfig {
            control_addr: self.sam.clone(),
            udp_addr: self.sam_udp,
            min_version: self.min_version.clone(),
            max_version: self.max_version.clone(),
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
        }
    }
}
