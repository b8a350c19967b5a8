//! Relay hop handling
//!
//! A relay request carries the next packet sealed for us. We open our layer
//! and either pass the result on to the record's next hop after its delay,
//! or keep it when the chain ends here.

use bote_core::{NextHop, Packet, RelayRequest};
use parking_lot::RwLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Packet error: {0}")]
    Packet(#[from] bote_core::Error),
    #[error("Cannot open layer: {0}")]
    Open(String),
    #[error("Relay delay {delay}s exceeds limit of {max}s")]
    DelayTooLong { delay: u32, max: u64 },
}

/// Removes the layer sealed for this node.
pub trait LayerOpener: Send + Sync {
    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, RelayError>;
}

/// Opener for test networks where layers travel unencrypted
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextOpener;

impl LayerOpener for PlaintextOpener {
    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, RelayError> {
        Ok(sealed.to_vec())
    }
}

/// Result of processing a relay request
#[derive(Debug)]
pub enum RelayAction {
    /// Send `packet` to `to` once `delay` has passed
    Forward {
        to: NextHop,
        delay: Duration,
        packet: Packet,
    },
    /// The chain ends here
    Deliver(Packet),
    /// Relay disabled
    Drop,
}

/// Relay statistics
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    pub requests_processed: u64,
    pub requests_forwarded: u64,
    pub requests_delivered: u64,
    pub requests_dropped: u64,
}

/// Relay hop handler
pub struct Relay {
    /// Our own destination, as it appears in next-hop fields
    local: NextHop,
    opener: Box<dyn LayerOpener>,
    enabled: bool,
    /// Longest delay we agree to hold a packet for
    max_delay: Duration,
    stats: RwLock<RelayStats>,
}

impl Relay {
    pub fn new(
        local: NextHop,
        opener: Box<dyn LayerOpener>,
        enabled: bool,
        max_delay: Duration,
    ) -> Self {
        Self {
            local,
            opener,
            enabled,
            max_delay,
            stats: RwLock::new(RelayStats::default()),
        }
    }

    /// Process a relay request addressed to us
    pub fn process(&self, record: RelayRequest) -> Result<RelayAction, RelayError> {
        if !self.enabled {
            self.stats.write().requests_dropped += 1;
            return Ok(RelayAction::Drop);
        }

        self.stats.write().requests_processed += 1;

        let packet = match self.open_layer(&record) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.write().requests_dropped += 1;
                return Err(e);
            }
        };

        if record.next_hop == self.local {
            debug!("Relay chain {} ends here", record.id);
            self.stats.write().requests_delivered += 1;
            return Ok(RelayAction::Deliver(packet));
        }

        let delay = record.delay_duration();
        if delay > self.max_delay {
            self.stats.write().requests_dropped += 1;
            return Err(RelayError::DelayTooLong {
                delay: record.delay,
                max: self.max_delay.as_secs(),
            });
        }

        debug!(
            "Relaying {} to {} in {}s",
            record.id, record.next_hop, record.delay
        );
        self.stats.write().requests_forwarded += 1;
        Ok(RelayAction::Forward {
            delay,
            to: record.next_hop,
            packet,
        })
    }

    fn open_layer(&self, record: &RelayRequest) -> Result<Packet, RelayError> {
        let opened = self.opener.open(&record.payload)?;
        Ok(Packet::parse(&opened)?)
    }

    /// Count a request turned away before processing.
    pub fn reject(&self) {
        self.stats.write().requests_dropped += 1;
    }

    /// Get relay statistics
    pub fn stats(&self) -> RelayStats {
        self.stats.read().clone()
    }

    /// Is relay enabled?
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bote_core::{CorrelationId, PacketType, NEXT_HOP_LEN};

    struct RefusingOpener;

    impl LayerOpener for RefusingOpener {
        fn open(&self, _sealed: &[u8]) -> Result<Vec<u8>, RelayError> {
            Err(RelayError::Open("wrong key".into()))
        }
    }

    fn local() -> NextHop {
        NextHop([1; NEXT_HOP_LEN])
    }

    fn record(next_hop: NextHop, payload: Vec<u8>) -> RelayRequest {
        RelayRequest {
            id: CorrelationId([9; 32]),
            hashcash: b"hc".to_vec(),
            delay: 5,
            next_hop,
            payload,
        }
    }

    fn inner() -> Packet {
        Packet::new(4, PacketType::FetchRequest, b"key")
    }

    fn relay(opener: Box<dyn LayerOpener>, enabled: bool) -> Relay {
        Relay::new(local(), opener, enabled, Duration::from_secs(60))
    }

    #[test]
    fn test_forward_to_next_hop() {
        let relay = relay(Box::new(PlaintextOpener), true);
        let other = NextHop([2; NEXT_HOP_LEN]);

        let action = relay
            .process(record(other.clone(), inner().into_bytes()))
            .unwrap();
        match action {
            RelayAction::Forward { to, delay, packet } => {
                assert_eq!(to, other);
                assert_eq!(delay, Duration::from_secs(5));
                assert_eq!(packet, inner());
            }
            other => panic!("unexpected action: {:?}", other),
        }

        let stats = relay.stats();
        assert_eq!(stats.requests_processed, 1);
        assert_eq!(stats.requests_forwarded, 1);
    }

    #[test]
    fn test_delay_over_limit_dropped() {
        let relay = relay(Box::new(PlaintextOpener), true);
        let mut late = record(NextHop([2; NEXT_HOP_LEN]), inner().into_bytes());
        late.delay = u32::MAX;

        assert!(matches!(
            relay.process(late),
            Err(RelayError::DelayTooLong {
                delay: u32::MAX,
                max: 60
            })
        ));
        let stats = relay.stats();
        assert_eq!(stats.requests_dropped, 1);
        assert_eq!(stats.requests_forwarded, 0);

        // the limit itself is accepted
        let mut edge = record(NextHop([2; NEXT_HOP_LEN]), inner().into_bytes());
        edge.delay = 60;
        assert!(matches!(
            relay.process(edge),
            Ok(RelayAction::Forward { .. })
        ));
    }

    #[test]
    fn test_deliver_when_chain_ends_here() {
        let relay = relay(Box::new(PlaintextOpener), true);
        let action = relay.process(record(local(), inner().into_bytes())).unwrap();
        assert!(matches!(action, RelayAction::Deliver(p) if p == inner()));
        assert_eq!(relay.stats().requests_delivered, 1);
    }

    #[test]
    fn test_disabled_relay_drops() {
        let relay = relay(Box::new(PlaintextOpener), false);
        assert!(!relay.is_enabled());

        let action = relay.process(record(local(), inner().into_bytes())).unwrap();
        assert!(matches!(action, RelayAction::Drop));
        assert_eq!(relay.stats().requests_dropped, 1);
        assert_eq!(relay.stats().requests_processed, 0);
    }

    #[test]
    fn test_unopenable_layer() {
        let relay = relay(Box::new(RefusingOpener), true);
        assert!(matches!(
            relay.process(record(local(), inner().into_bytes())),
            Err(RelayError::Open(_))
        ));
        assert_eq!(relay.stats().requests_dropped, 1);
    }

    #[test]
    fn test_opened_layer_must_be_a_packet() {
        let relay = relay(Box::new(PlaintextOpener), true);
        assert!(matches!(
            relay.process(record(local(), b"not a packet".to_vec())),
            Err(RelayError::Packet(bote_core::Error::BadHeader))
        ));
    }
}
