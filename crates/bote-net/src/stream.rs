//! Virtual streams over the router
//!
//! Each dial or accept runs on its own control connection. Once the router
//! reports `STREAM STATUS RESULT=OK` that socket becomes a raw byte pipe to
//! the remote destination.

use crate::addr::Addr;
use crate::codec::{Command, Reply};
use crate::control::{with_timeout, SamClient};
use crate::error::{Result, SamError};
use bytes::{Buf, BytesMut};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// An established stream to a remote destination
pub struct StreamConn {
    io: TcpStream,
    /// Bytes the router sent right after the status lines
    pending: BytesMut,
    local: Addr,
    remote: Addr,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl StreamConn {
    pub(crate) fn new(io: TcpStream, pending: BytesMut, local: Addr, remote: Addr) -> Self {
        Self {
            io,
            pending,
            local,
            remote,
            read_timeout: None,
            write_timeout: None,
        }
    }

    pub fn local_addr(&self) -> &Addr {
        &self.local
    }

    pub fn remote_addr(&self) -> &Addr {
        &self.remote
    }

    /// Address of the router end of the pipe
    pub fn router_addr(&self) -> Result<SocketAddr> {
        Ok(self.io.peer_addr()?)
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) {
        self.write_timeout = timeout;
    }

    /// Set both timeouts.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
        self.write_timeout = timeout;
    }

    /// Read some bytes; `Ok(0)` means the remote closed.
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let limit = self.read_timeout;
        with_timeout(limit, async { Ok(self.read(buf).await?) }).await
    }

    pub async fn send_all(&mut self, data: &[u8]) -> Result<()> {
        let limit = self.write_timeout;
        with_timeout(limit, async {
            self.write_all(data).await?;
            Ok(self.flush().await?)
        })
        .await
    }

    pub async fn close(mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}

impl fmt::Debug for StreamConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConn")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .field("router", &self.io.peer_addr().ok())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl AsyncRead for StreamConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.pending.is_empty() {
            let n = this.pending.len().min(buf.remaining());
            buf.put_slice(&this.pending[..n]);
            this.pending.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for StreamConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().io).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_shutdown(cx)
    }
}

/// Turn a dial target into a destination.
///
/// A trailing `:port` is ignored. Names ending in `.i2p` are looked up,
/// other dotted names are rejected, anything else must be base64.
pub async fn resolve_target(client: &SamClient, target: &str) -> Result<Addr> {
    let host = target.split_once(':').map_or(target, |(host, _)| host);

    if host.ends_with(".i2p") {
        return client
            .lookup(host)
            .await
            .map_err(|e| SamError::LookupFailed {
                name: host.to_string(),
                source: Box::new(e),
            });
    }
    if host.contains('.') {
        return Err(SamError::AddressInvalid(host.to_string()));
    }
    Addr::new(host)
}

fn check_connect_status(reply: &Reply) -> Result<()> {
    for token in reply.tokens() {
        match token {
            "STREAM" | "STATUS" => continue,
            "RESULT=OK" => return Ok(()),
            other => return Err(SamError::ConnectRejected(other.to_string())),
        }
    }
    Err(SamError::Protocol(format!(
        "no result in stream status: {}",
        reply.line()
    )))
}

/// Open a stream from session `id` to `target`.
pub async fn dial(client: &SamClient, id: &str, local: &Addr, target: &str) -> Result<StreamConn> {
    let remote = resolve_target(client, target).await?;

    let mut conn = client.connect().await?;
    let reply = conn
        .request(Command::StreamConnect {
            id: id.to_string(),
            destination: remote.to_string(),
        })
        .await?;
    if let Err(e) = check_connect_status(&reply) {
        warn!("Stream to {} failed: {}", remote.short(), e);
        return Err(e);
    }

    debug!("Stream to {} established", remote.short());
    let (io, pending) = conn.into_parts();
    Ok(StreamConn::new(io, pending, local.clone(), remote))
}

/// Wait for the next inbound stream on session `id`.
pub async fn accept(client: &SamClient, id: &str, local: &Addr) -> Result<StreamConn> {
    let mut conn = client.connect().await?;
    let reply = conn
        .request(Command::StreamAccept { id: id.to_string() })
        .await?;
    if !reply.starts_with("STREAM STATUS RESULT=OK") {
        return Err(SamError::Protocol(reply.line().to_string()));
    }

    // the peer line arrives whenever someone connects
    conn.set_timeout(None);
    let peer = conn.read_reply().await?;
    let remote = peer
        .tokens()
        .next()
        .ok_or_else(|| SamError::Protocol("empty peer line".into()))
        .and_then(|token| Addr::new(token))?;

    debug!("Accepted stream from {}", remote.short());
    let (io, pending) = conn.into_parts();
    Ok(StreamConn::new(io, pending, local.clone(), remote))
}
