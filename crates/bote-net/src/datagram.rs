//! Datagrams forwarded through the router over local UDP
//!
//! Outgoing datagrams go to the router's forwarding port prefixed with
//! `3.0 <session> <destination>\n`. Incoming ones arrive on our socket as
//! `<source destination>[ options]\n<payload>`.

use crate::addr::{Addr, PeerAddr};
use crate::error::{Result, SamError};
use parking_lot::RwLock;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Largest datagram read from the router, header included
pub const DATAGRAM_MTU: usize = 65536;

/// SAM version tag at the start of every outgoing header
const DATAGRAM_VERSION: &str = "3.0";

/// Router forwarding endpoint when none is configured: control port - 1.
pub fn default_forward_addr(control_peer: SocketAddr) -> SocketAddr {
    SocketAddr::new(control_peer.ip(), control_peer.port().saturating_sub(1))
}

/// UDP socket bound to a DATAGRAM session
#[derive(Debug)]
pub struct DatagramSocket {
    socket: UdpSocket,
    router: SocketAddr,
    session: String,
    local: Addr,
    read_timeout: RwLock<Option<Duration>>,
    write_timeout: RwLock<Option<Duration>>,
    closed: CancellationToken,
}

impl DatagramSocket {
    /// Bind on `ip`, port 0.
    pub async fn bind(
        ip: IpAddr,
        router: SocketAddr,
        session: impl Into<String>,
        local: Addr,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::new(ip, 0)).await?;
        Ok(Self {
            socket,
            router,
            session: session.into(),
            local,
            read_timeout: RwLock::new(None),
            write_timeout: RwLock::new(None),
            closed: CancellationToken::new(),
        })
    }

    /// Where the router should forward our datagrams
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn router_addr(&self) -> SocketAddr {
        self.router
    }

    pub fn local_addr(&self) -> &Addr {
        &self.local
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) {
        *self.read_timeout.write() = timeout;
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) {
        *self.write_timeout.write() = timeout;
    }

    /// Close the socket for every holder of this handle. Pending and later
    /// sends and receives fail with `ConnectionClosed`.
    pub fn close(&self) {
        if !self.closed.is_cancelled() {
            debug!("Closing datagram socket for session {}", self.session);
        }
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Send `payload` to `to`; returns the payload bytes sent.
    pub async fn send_to(&self, payload: &[u8], to: &PeerAddr) -> Result<usize> {
        let dest = match to {
            PeerAddr::I2p(addr) => addr,
            PeerAddr::Ip(addr) => return Err(SamError::UnsupportedNetwork(addr.to_string())),
        };

        let header = format!("{} {} {}\n", DATAGRAM_VERSION, self.session, dest);
        let mut frame = Vec::with_capacity(header.len() + payload.len());
        frame.extend_from_slice(header.as_bytes());
        frame.extend_from_slice(payload);

        let limit = *self.write_timeout.read();
        let sent = self
            .guarded(limit, self.socket.send_to(&frame, self.router))
            .await?;
        trace!("Sent {} byte datagram to {}", payload.len(), dest.short());
        Ok(sent.saturating_sub(header.len()))
    }

    /// Receive one datagram into `buf`; returns its length and source.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, Addr)> {
        let mut scratch = vec![0u8; DATAGRAM_MTU];
        let limit = *self.read_timeout.read();
        let (n, from) = self
            .guarded(limit, self.socket.recv_from(&mut scratch))
            .await?;

        if from != self.router {
            debug!("Datagram from {} instead of router {}", from, self.router);
        }

        let (source, payload) = split_datagram(&scratch[..n])?;
        if payload.len() > buf.len() {
            return Err(SamError::DatagramOverflow {
                needed: payload.len(),
                capacity: buf.len(),
            });
        }
        buf[..payload.len()].copy_from_slice(payload);
        Ok((payload.len(), source))
    }

    /// Run a socket operation under `limit`, cut short by [`close`](Self::close).
    async fn guarded<T, F>(&self, limit: Option<Duration>, fut: F) -> Result<T>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        if self.closed.is_cancelled() {
            return Err(SamError::ConnectionClosed);
        }
        let op = crate::control::with_timeout(limit, async { Ok(fut.await?) });
        tokio::select! {
            _ = self.closed.cancelled() => Err(SamError::ConnectionClosed),
            res = op => res,
        }
    }
}

/// Split a forwarded datagram into source destination and payload.
fn split_datagram(data: &[u8]) -> Result<(Addr, &[u8])> {
    let newline = data
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| SamError::Protocol("datagram without header".into()))?;

    let header = std::str::from_utf8(&data[..newline])
        .map_err(|_| SamError::Protocol("datagram header is not UTF-8".into()))?;
    let source = header
        .split_whitespace()
        .next()
        .ok_or_else(|| SamError::Protocol("empty datagram header".into()))?;

    Ok((Addr::new(source)?, &data[newline + 1..]))
}
