//! bote core library
//!
//! This crate provides the binary wire format spoken between bote peers
//! over the anonymizing network.
//!
//! # Modules
//!
//! - [`packet`]: Packet framing (magic header, version, type tag) and on-demand decoding
//! - [`relay`]: Single-hop relay request records
//! - [`peer_list`]: Peer list lookup records
//! - [`chain`]: Onion-style relay chain construction
//! - [`types`]: Fixed-size identifiers
//! - [`error`]: Error types

pub mod chain;
pub mod error;
pub mod packet;
pub mod peer_list;
pub mod relay;
pub mod types;

#[cfg(test)]
mod test_vectors;

pub use chain::{LayerSealer, RelayChain, RelayHop};
pub use error::{Error, Result};
pub use packet::{Message, Packet, PacketType, MAGIC, PROTOCOL_VERSION};
pub use peer_list::PeerListRequest;
pub use relay::RelayRequest;
pub use types::*;
