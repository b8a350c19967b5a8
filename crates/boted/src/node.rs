//! Node service - datagram session and inbound packet loop

use crate::config::Config;
use crate::relay::{LayerOpener, PlaintextOpener, Relay, RelayAction, RelayStats};
use bote_core::{Message, Packet};
use bote_net::{
    Addr, DatagramSession, DatagramSocket, PacketTransport, PeerAddr, SamError, Session,
    SessionLifecycle, DATAGRAM_MTU,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Inbound messages buffered for the higher layers
const INBOUND_QUEUE: usize = 256;

/// Node errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("SAM error: {0}")]
    Sam(#[from] SamError),
    #[error("Packet error: {0}")]
    Packet(#[from] bote_core::Error),
    #[error("Session closed")]
    Closed,
}

/// A decoded message and its sender
#[derive(Debug)]
pub struct Inbound {
    pub from: Addr,
    pub message: Message,
}

/// Relay forwards waiting out their delay
#[derive(Clone)]
struct Forwards {
    socket: Arc<DatagramSocket>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    max_pending: usize,
}

impl Forwards {
    fn is_full(&self) -> bool {
        self.tracker.len() >= self.max_pending
    }

    fn schedule(&self, to: PeerAddr, delay: Duration, packet: Packet) {
        let socket = self.socket.clone();
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Relay forward cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = socket.send_to(packet.as_bytes(), &to).await {
                        warn!("Relay forward failed: {}", e);
                    }
                }
            }
        });
    }
}

/// A running node
pub struct Node {
    session: DatagramSession,
    socket: Arc<DatagramSocket>,
    relay: Arc<Relay>,
    forwards: Forwards,
}

impl Node {
    /// Bring up the datagram session, relaying in the clear.
    pub async fn start(config: Config) -> Result<Self, NodeError> {
        Self::start_with(config, Box::new(PlaintextOpener)).await
    }

    /// Connect, load or generate keys, and create the datagram session.
    pub async fn start_with(
        config: Config,
        opener: Box<dyn LayerOpener>,
    ) -> Result<Self, NodeError> {
        info!("Connecting to SAM bridge at {}", config.sam);

        let mut session = Session::new(config.session_name.clone(), config.sam_config());
        session.connect().await?;
        session.ensure_keyfile(&config.keyfile).await?;
        let session = session.into_datagram().await?;
        let socket = session.socket().ok_or(NodeError::Closed)?;

        let local = socket.local_addr();
        match local.base32() {
            Ok(b32) => info!("Node address: {}", b32),
            Err(e) => warn!("Cannot derive b32 address: {}", e),
        }

        let relay = Arc::new(Relay::new(
            local.next_hop()?,
            opener,
            config.relay,
            config.max_relay_delay(),
        ));
        if config.relay {
            info!(
                "Relay mode enabled (max delay {}s, {} pending forwards)",
                config.max_relay_delay_secs, config.max_pending_forwards
            );
        }

        let forwards = Forwards {
            socket: socket.clone(),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            max_pending: config.max_pending_forwards,
        };

        Ok(Self {
            session,
            socket,
            relay,
            forwards,
        })
    }

    pub fn local_addr(&self) -> &Addr {
        self.socket.local_addr()
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Relay forwards still waiting to be sent
    pub fn pending_forwards(&self) -> usize {
        self.forwards.tracker.len()
    }

    /// Send a packet to a peer.
    pub async fn send(&self, packet: &Packet, to: &Addr) -> Result<usize, NodeError> {
        let sent = self
            .session
            .send_to(packet.as_bytes(), &PeerAddr::from(to.clone()))
            .await?;
        Ok(sent)
    }

    /// Spawn the receive loop. Messages that are not relay requests, and
    /// relay chains ending here, arrive on the returned channel.
    pub fn spawn_receiver(&self) -> (mpsc::Receiver<Inbound>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
        let handle = tokio::spawn(receive_loop(
            self.socket.clone(),
            self.relay.clone(),
            self.forwards.clone(),
            tx,
        ));
        (rx, handle)
    }

    /// Cancel pending relay forwards, close the session and return the
    /// final relay statistics.
    pub async fn shutdown(mut self) -> Result<RelayStats, NodeError> {
        let pending = self.forwards.tracker.len();
        if pending > 0 {
            info!("Cancelling {} pending relay forwards", pending);
        }
        self.forwards.cancel.cancel();
        self.forwards.tracker.close();
        self.forwards.tracker.wait().await;

        self.session.close().await?;
        Ok(self.relay.stats())
    }
}

async fn receive_loop(
    socket: Arc<DatagramSocket>,
    relay: Arc<Relay>,
    forwards: Forwards,
    tx: mpsc::Sender<Inbound>,
) {
    let mut buf = vec![0u8; DATAGRAM_MTU];

    loop {
        let (n, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(SamError::ConnectionClosed) => {
                debug!("Receive loop stopped: socket closed");
                return;
            }
            Err(SamError::Io(e)) => {
                warn!("Receive loop stopped: {}", e);
                return;
            }
            Err(e) => {
                debug!("Dropping datagram: {}", e);
                continue;
            }
        };

        let message = match Packet::parse(&buf[..n]).and_then(|p| p.message()) {
            Ok(message) => message,
            Err(e) => {
                debug!("Dropping packet from {}: {}", from.short(), e);
                continue;
            }
        };

        let message = match message {
            Message::RelayRequest(record) => match relay_hop(&forwards, &relay, record) {
                Some(message) => message,
                None => continue,
            },
            other => other,
        };

        if tx.send(Inbound { from, message }).await.is_err() {
            debug!("Inbound channel closed");
            return;
        }
    }
}

/// Handle one relay request; returns a message when the chain ends here.
fn relay_hop(
    forwards: &Forwards,
    relay: &Relay,
    record: bote_core::RelayRequest,
) -> Option<Message> {
    if relay.is_enabled() && forwards.is_full() {
        debug!(
            "{} relay forwards pending, dropping request {}",
            forwards.max_pending, record.id
        );
        relay.reject();
        return None;
    }

    match relay.process(record) {
        Ok(RelayAction::Forward { to, delay, packet }) => {
            forwards.schedule(PeerAddr::from(Addr::from_next_hop(&to)), delay, packet);
            None
        }
        Ok(RelayAction::Deliver(packet)) => match packet.message() {
            Ok(message) => Some(message),
            Err(e) => {
                debug!("Dropping relayed packet: {}", e);
                None
            }
        },
        Ok(RelayAction::Drop) => {
            debug!("Relay disabled, dropping request");
            None
        }
        Err(e) => {
            debug!("Dropping relay request: {}", e);
            None
        }
    }
}
