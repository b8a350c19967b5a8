//! Session lifecycle
//!
//! A session owns one long-lived control connection used only for
//! `SESSION CREATE` and close. Everything else goes through [`SamClient`]
//! on connections of its own.

use crate::addr::{Addr, PeerAddr};
use crate::codec::Command;
use crate::control::{ControlConn, SamClient, SamConfig};
use crate::datagram::{default_forward_addr, DatagramSocket};
use crate::error::{Result, SamError};
use crate::keystore::{self, Destination};
use crate::stream::{self, StreamConn};
use crate::transport::{Dialer, Listener, PacketTransport, Resolver, SessionLifecycle};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub use crate::codec::Style;

/// Session lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    /// HELLO done on the control connection
    Connected,
    Created(Style),
    Active(Style),
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connected => f.write_str("connected"),
            Self::Created(style) => write!(f, "created ({})", style),
            Self::Active(style) => write!(f, "active ({})", style),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// A named session on the router
pub struct Session {
    name: String,
    client: SamClient,
    control: Option<ControlConn>,
    keys: Option<Destination>,
    state: SessionState,
}

impl Session {
    pub fn new(name: impl Into<String>, config: SamConfig) -> Self {
        Self {
            name: name.into(),
            client: SamClient::new(config),
            control: None,
            keys: None,
            state: SessionState::Disconnected,
        }
    }

    /// A session with a random `bote-` name.
    pub fn with_random_name(config: SamConfig) -> Self {
        let suffix: [u8; 6] = rand::random();
        Self::new(format!("bote-{}", hex::encode(suffix)), config)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn keys(&self) -> Option<&Destination> {
        self.keys.as_ref()
    }

    pub fn client(&self) -> &SamClient {
        &self.client
    }

    /// Negotiated SAM version, once connected
    pub fn version(&self) -> Option<&str> {
        self.control.as_ref().map(ControlConn::version)
    }

    fn expect_state(&self, expected: SessionState, name: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(SamError::InvalidState {
                state: self.state,
                expected: name,
            });
        }
        Ok(())
    }

    /// Open the control connection and perform the handshake.
    pub async fn connect(&mut self) -> Result<()> {
        self.expect_state(SessionState::Disconnected, "disconnected")?;
        let control = self.client.connect().await?;
        debug!("Session {} connected (SAM {})", self.name, control.version());
        self.control = Some(control);
        self.state = SessionState::Connected;
        Ok(())
    }

    pub fn set_keys(&mut self, keys: Destination) {
        self.keys = Some(keys);
    }

    /// Load or generate the destination at `path`. On failure the session
    /// is left without keys.
    pub async fn ensure_keyfile(&mut self, path: &Path) -> Result<&Destination> {
        self.keys = None;
        let keys = keystore::ensure_keyfile(&self.client, path).await?;
        Ok(self.keys.insert(keys))
    }

    /// Send SESSION CREATE on the control connection.
    async fn create(&mut self, style: Style, forward: Option<(String, u16)>) -> Result<Addr> {
        self.expect_state(SessionState::Connected, "connected")?;
        let keys = self.keys.as_ref().ok_or(SamError::NoKeys)?;
        let control = self.control.as_mut().ok_or(SamError::ConnectionClosed)?;

        let reply = control
            .request(Command::SessionCreate {
                style,
                id: self.name.clone(),
                destination: keys.private().to_string(),
                forward,
            })
            .await?;
        if !reply.starts_with("SESSION STATUS RESULT=OK DESTINATION=") {
            return Err(SamError::Protocol(reply.line().to_string()));
        }

        self.state = SessionState::Created(style);
        let local = keys.public().clone();
        info!("Session {} created ({}) as {}", self.name, style, local.short());
        Ok(local)
    }

    /// Create a STREAM session.
    pub async fn into_stream(mut self) -> Result<StreamSession> {
        let local = self.create(Style::Stream, None).await?;
        self.state = SessionState::Active(Style::Stream);
        Ok(StreamSession {
            session: self,
            local,
        })
    }

    /// Bind the local UDP socket and create a DATAGRAM session forwarding
    /// to it.
    pub async fn into_datagram(mut self) -> Result<DatagramSession> {
        self.expect_state(SessionState::Connected, "connected")?;
        let control = self.control.as_ref().ok_or(SamError::ConnectionClosed)?;
        let local_ip = control.local_addr()?.ip();
        let router = match self.client.config().udp_addr {
            Some(addr) => addr,
            None => default_forward_addr(control.peer_addr()?),
        };

        let public = self.keys.as_ref().ok_or(SamError::NoKeys)?.public().clone();
        let socket = DatagramSocket::bind(local_ip, router, self.name.clone(), public).await?;
        let bound = socket.socket_addr()?;
        debug!("Datagram socket on {} (router {})", bound, router);

        self.create(Style::Datagram, Some((bound.ip().to_string(), bound.port())))
            .await?;
        self.state = SessionState::Active(Style::Datagram);
        Ok(DatagramSession {
            session: self,
            socket: Some(Arc::new(socket)),
        })
    }

    /// Release the control connection. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(control) = self.control.take() {
            control.shutdown().await.ok();
            info!("Session {} closed", self.name);
        }
        self.state = SessionState::Closed;
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}

/// An active STREAM session
#[derive(Debug)]
pub struct StreamSession {
    session: Session,
    local: Addr,
}

impl StreamSession {
    /// Connect, load or generate keys, and create the session.
    pub async fn open(config: SamConfig, name: &str, keyfile: &Path) -> Result<Self> {
        let mut session = Session::new(name, config);
        session.connect().await?;
        session.ensure_keyfile(keyfile).await?;
        session.into_stream().await
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

#[async_trait]
impl Resolver for StreamSession {
    async fn lookup(&self, name: &str) -> Result<Addr> {
        self.session.client.lookup(name).await
    }
}

#[async_trait]
impl Dialer for StreamSession {
    async fn dial(&self, target: &str) -> Result<StreamConn> {
        stream::dial(&self.session.client, &self.session.name, &self.local, target).await
    }
}

#[async_trait]
impl Listener for StreamSession {
    async fn accept(&self) -> Result<StreamConn> {
        stream::accept(&self.session.client, &self.session.name, &self.local).await
    }

    fn local_addr(&self) -> &Addr {
        &self.local
    }
}

#[async_trait]
impl SessionLifecycle for StreamSession {
    async fn close(&mut self) -> Result<()> {
        self.session.close().await
    }
}

/// An active DATAGRAM session
#[derive(Debug)]
pub struct DatagramSession {
    session: Session,
    socket: Option<Arc<DatagramSocket>>,
}

impl DatagramSession {
    /// Connect, load or generate keys, and create the session.
    pub async fn open(config: SamConfig, name: &str, keyfile: &Path) -> Result<Self> {
        let mut session = Session::new(name, config);
        session.connect().await?;
        session.ensure_keyfile(keyfile).await?;
        session.into_datagram().await
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Shared handle for a concurrent receive loop; `None` once closed.
    /// Handles taken earlier stop working when the session closes.
    pub fn socket(&self) -> Option<Arc<DatagramSocket>> {
        self.socket.clone()
    }

    fn live_socket(&self) -> Result<&DatagramSocket> {
        self.socket.as_deref().ok_or(SamError::ConnectionClosed)
    }

    pub fn local_addr(&self) -> Option<&Addr> {
        self.session.keys().map(Destination::public)
    }
}

#[async_trait]
impl Resolver for DatagramSession {
    async fn lookup(&self, name: &str) -> Result<Addr> {
        self.session.client.lookup(name).await
    }
}

#[async_trait]
impl PacketTransport for DatagramSession {
    async fn send_to(&self, payload: &[u8], to: &PeerAddr) -> Result<usize> {
        self.live_socket()?.send_to(payload, to).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, Addr)> {
        self.live_socket()?.recv_from(buf).await
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) {
        if let Some(socket) = &self.socket {
            socket.set_read_timeout(timeout);
        }
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) {
        if let Some(socket) = &self.socket {
            socket.set_write_timeout(timeout);
        }
    }
}

#[async_trait]
impl SessionLifecycle for DatagramSession {
    async fn close(&mut self) -> Result<()> {
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
        self.session.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRouter;
    use tempfile::TempDir;
    use tokio::net::UdpSocket;

    fn router_reply(line: &str) -> Option<String> {
        if line.starts_with("HELLO") {
            Some("HELLO REPLY RESULT=OK VERSION=3.0\n".into())
        } else if line.starts_with("SESSION CREATE") {
            Some("SESSION STATUS RESULT=OK DESTINATION=priv\n".into())
        } else if line == "DEST GENERATE" {
            Some("DEST REPLY PUB=pubdest PRIV=priv\n".into())
        } else if line.starts_with("STREAM CONNECT") {
            Some("STREAM STATUS RESULT=OK\n".into())
        } else {
            None
        }
    }

    fn keys() -> Destination {
        Destination::new(Addr::new("pubdest").unwrap(), "priv")
    }

    #[test]
    fn test_random_name() {
        let a = Session::with_random_name(SamConfig::default());
        let b = Session::with_random_name(SamConfig::default());
        assert!(a.name().starts_with("bote-"));
        assert_eq!(a.name().len(), "bote-".len() + 12);
        assert_ne!(a.name(), b.name());
        assert_eq!(a.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_stream_session_lifecycle() {
        let router = MockRouter::start(router_reply).await;
        let mut session = Session::new("t1", router.config());

        session.connect().await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.version(), Some("3.0"));
        session.set_keys(keys());

        let mut streams = session.into_stream().await.unwrap();
        assert_eq!(streams.session().state(), SessionState::Active(Style::Stream));
        assert_eq!(streams.local_addr().as_str(), "pubdest");
        assert!(router
            .commands()
            .contains(&"SESSION CREATE STYLE=STREAM ID=t1 DESTINATION=priv".to_string()));

        let conn = streams.dial("abc").await.unwrap();
        assert_eq!(conn.remote_addr().as_str(), "abc");
        assert_eq!(conn.local_addr().as_str(), "pubdest");

        streams.close().await.unwrap();
        assert_eq!(streams.session().state(), SessionState::Closed);
        streams.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_requires_keys() {
        let router = MockRouter::start(router_reply).await;
        let mut session = Session::new("t2", router.config());
        session.connect().await.unwrap();

        assert!(matches!(session.into_stream().await, Err(SamError::NoKeys)));
        assert_eq!(router.commands_matching("SESSION CREATE"), 0);
    }

    #[tokio::test]
    async fn test_create_requires_connection() {
        let mut session = Session::new("t3", SamConfig::default());
        session.set_keys(keys());
        let err = session.into_stream().await.unwrap_err();
        assert!(matches!(
            err,
            SamError::InvalidState {
                state: SessionState::Disconnected,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_create_rejected() {
        let router = MockRouter::start(|line| {
            if line.starts_with("SESSION CREATE") {
                Some("SESSION STATUS RESULT=DUPLICATED_ID\n".into())
            } else {
                router_reply(line)
            }
        })
        .await;
        let mut session = Session::new("dup", router.config());
        session.connect().await.unwrap();
        session.set_keys(keys());

        assert!(matches!(
            session.into_stream().await,
            Err(SamError::Protocol(l)) if l == "SESSION STATUS RESULT=DUPLICATED_ID"
        ));
    }

    #[tokio::test]
    async fn test_failed_keyfile_leaves_no_keys() {
        let router = MockRouter::start(|line| {
            if line == "DEST GENERATE" {
                Some("DEST REPLY PUB=only\n".into())
            } else {
                router_reply(line)
            }
        })
        .await;
        let dir = TempDir::new().unwrap();
        let mut session = Session::new("t4", router.config());
        session.set_keys(keys());

        assert!(session
            .ensure_keyfile(&dir.path().join("dest.keys"))
            .await
            .is_err());
        assert!(session.keys().is_none());
        assert!(!dir.path().join("dest.keys").exists());
    }

    #[tokio::test]
    async fn test_stream_session_open() {
        let router = MockRouter::start(router_reply).await;
        let dir = TempDir::new().unwrap();

        let session = StreamSession::open(router.config(), "easy", &dir.path().join("k"))
            .await
            .unwrap();
        assert_eq!(session.local_addr().as_str(), "pubdest");
        assert_eq!(router.commands_matching("DEST GENERATE"), 1);
    }

    #[tokio::test]
    async fn test_datagram_session_forwarding() {
        let udp_router = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let router = MockRouter::start(router_reply).await;
        let mut config = router.config();
        config.udp_addr = Some(udp_router.local_addr().unwrap());

        let dir = TempDir::new().unwrap();
        let mut session = DatagramSession::open(config, "dg", &dir.path().join("k"))
            .await
            .unwrap();
        let socket = session.socket().unwrap();
        let bound = socket.socket_addr().unwrap();
        let expected = format!(
            "SESSION CREATE STYLE=DATAGRAM ID=dg DESTINATION=priv HOST=127.0.0.1 PORT={}",
            bound.port()
        );
        assert!(router.commands().contains(&expected));

        let to = PeerAddr::from(Addr::new("peer").unwrap());
        assert_eq!(session.send_to(b"hi", &to).await.unwrap(), 2);
        let mut buf = [0u8; 64];
        let (n, _) = udp_router.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"3.0 dg peer\nhi");

        udp_router.send_to(b"peer\nback", bound).await.unwrap();
        let (n, from) = session.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"back");
        assert_eq!(from.as_str(), "peer");

        session.close().await.unwrap();
        assert!(session.socket().is_none());
        assert!(matches!(
            session.send_to(b"x", &to).await,
            Err(SamError::ConnectionClosed)
        ));
        // handles taken before close are closed too
        assert!(socket.is_closed());
        assert!(matches!(
            socket.send_to(b"after-close", &to).await,
            Err(SamError::ConnectionClosed)
        ));
        assert!(matches!(
            socket.recv_from(&mut buf).await,
            Err(SamError::ConnectionClosed)
        ));
    }
}
