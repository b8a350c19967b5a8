//! SAM control connections
//!
//! Every operation other than session create/close runs on its own
//! short-lived connection: dial, HELLO, one command, one reply, close.

use crate::addr::Addr;
use crate::codec::{Command, ControlCodec, Reply};
use crate::error::{Result, SamError};
use crate::keystore::Destination;
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

/// Router connection settings
#[derive(Clone, Debug)]
pub struct SamConfig {
    /// SAM control address (host:port)
    pub control_addr: String,
    /// Datagram forwarding endpoint; defaults to the control port minus one
    pub udp_addr: Option<SocketAddr>,
    pub min_version: String,
    pub max_version: String,
    /// Applied to each connect and reply read (None = wait forever)
    pub timeout: Option<Duration>,
}

impl Default for SamConfig {
    fn default() -> Self {
        Self {
            control_addr: "127.0.0.1:7656".to_string(),
            udp_addr: None,
            min_version: "3.0".to_string(),
            max_version: "3.0".to_string(),
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl SamConfig {
    pub fn new(control_addr: impl Into<String>) -> Self {
        Self {
            control_addr: control_addr.into(),
            ..Self::default()
        }
    }
}

/// Run `fut` under an optional timeout.
pub(crate) async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .map_err(|_| SamError::Timeout)?,
        None => fut.await,
    }
}

/// A control connection that has completed the HELLO handshake
pub struct ControlConn {
    framed: Framed<TcpStream, ControlCodec>,
    version: String,
    timeout: Option<Duration>,
}

impl ControlConn {
    /// Dial the router and perform the HELLO handshake.
    pub async fn open(config: &SamConfig) -> Result<Self> {
        let stream = with_timeout(config.timeout, async {
            Ok(TcpStream::connect(config.control_addr.as_str()).await?)
        })
        .await?;
        stream.set_nodelay(true)?;

        let mut conn = Self {
            framed: Framed::new(stream, ControlCodec::new()),
            version: String::new(),
            timeout: config.timeout,
        };

        let reply = conn
            .request(Command::Hello {
                min: config.min_version.clone(),
                max: config.max_version.clone(),
            })
            .await?;

        conn.version = check_hello(&reply, config)?;
        debug!(
            "SAM handshake with {} done (version {})",
            config.control_addr, conn.version
        );
        Ok(conn)
    }

    /// Negotiated SAM version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Replace the per-reply timeout.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.framed.get_ref().local_addr()?)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.framed.get_ref().peer_addr()?)
    }

    pub async fn send(&mut self, command: Command) -> Result<()> {
        debug!("-> {}", command.name());
        let timeout = self.timeout;
        with_timeout(timeout, self.framed.send(command)).await
    }

    pub async fn read_reply(&mut self) -> Result<Reply> {
        let timeout = self.timeout;
        let next = with_timeout(timeout, async {
            self.framed.next().await.transpose()
        })
        .await?;
        next.ok_or(SamError::ConnectionClosed)
    }

    /// Send one command and read one reply line.
    pub async fn request(&mut self, command: Command) -> Result<Reply> {
        self.send(command).await?;
        self.read_reply().await
    }

    /// Close the write half and drop the connection.
    pub async fn shutdown(mut self) -> Result<()> {
        self.framed.get_mut().shutdown().await?;
        Ok(())
    }

    /// Raw socket plus any bytes read past the last reply.
    pub fn into_parts(self) -> (TcpStream, BytesMut) {
        let parts = self.framed.into_parts();
        (parts.io, parts.read_buf)
    }
}

/// Validate a HELLO reply and return the negotiated version.
fn check_hello(reply: &Reply, config: &SamConfig) -> Result<String> {
    if reply.value("RESULT") == Some("NOVERSION") {
        return Err(SamError::VersionMismatch {
            min: config.min_version.clone(),
            max: config.max_version.clone(),
        });
    }
    if !reply.starts_with("HELLO REPLY RESULT=OK") {
        return Err(SamError::Handshake(reply.line().to_string()));
    }
    Ok(reply
        .value("VERSION")
        .unwrap_or(config.max_version.as_str())
        .to_string())
}

/// Client for one-shot control operations
#[derive(Clone, Debug)]
pub struct SamClient {
    config: SamConfig,
}

impl SamClient {
    pub fn new(config: SamConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamConfig {
        &self.config
    }

    /// Open a fresh handshaken control connection.
    pub async fn connect(&self) -> Result<ControlConn> {
        ControlConn::open(&self.config).await
    }

    /// Resolve a name such as `foo.i2p` to a destination.
    pub async fn lookup(&self, name: &str) -> Result<Addr> {
        let mut conn = self.connect().await?;
        let reply = conn
            .request(Command::NamingLookup {
                name: name.to_string(),
            })
            .await?;
        let result = parse_lookup(name, &reply);
        conn.shutdown().await.ok();
        result
    }

    /// Ask the router for a fresh destination keypair.
    pub async fn generate_destination(&self) -> Result<Destination> {
        let mut conn = self.connect().await?;
        let reply = conn.request(Command::DestGenerate).await?;
        let result = parse_dest_generate(&reply);
        conn.shutdown().await.ok();
        result
    }
}

pub(crate) fn parse_lookup(name: &str, reply: &Reply) -> Result<Addr> {
    for token in reply.tokens() {
        match token {
            "NAMING" | "REPLY" | "RESULT=OK" | "NAME=ME" => continue,
            "RESULT=KEY_NOT_FOUND" => return Err(SamError::NotFound(name.to_string())),
            t if t.strip_prefix("NAME=") == Some(name) => continue,
            t => {
                if let Some(value) = t.strip_prefix("VALUE=") {
                    return Addr::new(value)
                        .map_err(|_| SamError::Protocol(reply.line().to_string()));
                }
                return Err(SamError::Protocol(reply.line().to_string()));
            }
        }
    }
    Err(SamError::Protocol(reply.line().to_string()))
}

pub(crate) fn parse_dest_generate(reply: &Reply) -> Result<Destination> {
    let mut public = None;
    let mut private = None;
    for token in reply.tokens() {
        match token {
            "DEST" | "REPLY" => continue,
            t => {
                if let Some(v) = t.strip_prefix("PUB=") {
                    let addr = Addr::new(v)
                        .map_err(|_| SamError::Protocol(reply.line().to_string()))?;
                    public = Some(addr);
                } else if let Some(v) = t.strip_prefix("PRIV=") {
                    private = Some(v.to_string());
                } else {
                    return Err(SamError::Protocol(format!(
                        "failed to parse generated keys: {}",
                        t
                    )));
                }
            }
        }
    }
    match (public, private) {
        (Some(public), Some(private)) if !private.is_empty() => {
            Ok(Destination::new(public, private))
        }
        _ => Err(SamError::Protocol(format!(
            "incomplete generated keys: {}",
            reply.tokens().take(2).collect::<Vec<_>>().join(" ")
        ))),
    }
}
