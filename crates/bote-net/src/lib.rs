//! SAM client for the bote network layer
//!
//! This crate provides:
//! - Destination addresses and keyfile persistence
//! - The SAM control-protocol handshake and line codec
//! - Stream and datagram sessions through a local I2P router
//! - Narrow capability traits for dialing, listening and datagram I/O

pub mod addr;
pub mod codec;
pub mod control;
pub mod datagram;
pub mod error;
pub mod keystore;
pub mod session;
pub mod stream;
pub mod transport;

#[cfg(test)]
mod mock;

pub use addr::{Addr, PeerAddr};
pub use control::{ControlConn, SamClient, SamConfig};
pub use datagram::{DatagramSocket, DATAGRAM_MTU};
pub use error::{Result, SamError};
pub use keystore::{ensure_keyfile, Destination};
pub use session::{DatagramSession, Session, SessionState, Style, StreamSession};
pub use stream::StreamConn;
pub use transport::{Dialer, Listener, PacketTransport, Resolver, SessionLifecycle};
