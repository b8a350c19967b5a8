//! boted - bote relay node
//!
//! This crate provides:
//! - Daemon configuration
//! - Datagram session bring-up and the inbound packet loop
//! - Relay hop handling for onion-style relay requests

pub mod config;
pub mod node;
pub mod relay;

pub use config::Config;
pub use node::{Inbound, Node, NodeError};
pub use relay::{LayerOpener, PlaintextOpener, Relay, RelayAction, RelayError, RelayStats};
