//! Capability traits over the concrete sessions
//!
//! Higher layers depend on the narrowest trait they need, so tests can swap
//! in an in-memory transport.

use crate::addr::{Addr, PeerAddr};
use crate::error::Result;
use crate::stream::StreamConn;
use async_trait::async_trait;
use std::time::Duration;

/// Name resolution
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn lookup(&self, name: &str) -> Result<Addr>;
}

/// Outgoing streams
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, target: &str) -> Result<StreamConn>;
}

/// Incoming streams
#[async_trait]
pub trait Listener: Send + Sync {
    async fn accept(&self) -> Result<StreamConn>;

    /// Our own destination
    fn local_addr(&self) -> &Addr;
}

/// Unreliable datagrams
#[async_trait]
pub trait PacketTransport: Send + Sync {
    async fn send_to(&self, payload: &[u8], to: &PeerAddr) -> Result<usize>;

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, Addr)>;

    fn set_read_timeout(&self, timeout: Option<Duration>);

    fn set_write_timeout(&self, timeout: Option<Duration>);
}

/// Session teardown
#[async_trait]
pub trait SessionLifecycle: Send {
    /// Close the control connection and any sockets. Idempotent.
    async fn close(&mut self) -> Result<()>;
}
