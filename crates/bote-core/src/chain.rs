//! Relay chain construction
//!
//! A chain is built from the innermost packet outwards. The record held by
//! each relay names where to send next, and carries the next packet sealed
//! for that relay, so a relay only ever opens its own layer.

use crate::error::Result;
use crate::packet::Packet;
use crate::relay::RelayRequest;
use crate::types::{CorrelationId, NextHop};

/// Encrypts one layer of a chain for the relay that will open it.
///
/// Implemented by the crypto component; this crate never looks inside.
pub trait LayerSealer {
    fn seal(&self, recipient: &NextHop, plaintext: &[u8]) -> Result<Vec<u8>>;
}

/// One relay in a chain
#[derive(Clone, Debug)]
pub struct RelayHop {
    pub id: CorrelationId,
    /// The relay holding this record
    pub relay: NextHop,
    /// Seconds the relay holds the payload
    pub delay: u32,
    pub hashcash: Vec<u8>,
}

/// Builder for a relay chain
#[derive(Clone, Debug)]
pub struct RelayChain {
    version: u8,
    /// Minimum body size of every record (0 = no padding)
    min_size: usize,
    hops: Vec<RelayHop>,
}

impl RelayChain {
    pub fn new(version: u8) -> Self {
        Self {
            version,
            min_size: 0,
            hops: Vec::new(),
        }
    }

    /// Zero-pad every record body to at least `size` bytes, so that short
    /// final layers do not stand out by length.
    pub fn min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    /// Append a hop. Hops are given in travel order.
    pub fn hop(mut self, hop: RelayHop) -> Self {
        self.hops.push(hop);
        self
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Wrap `inner` for delivery to `destination` through every hop.
    ///
    /// Returns the first recipient and the packet to send it. With no hops
    /// that is `destination` and `inner` itself.
    pub fn build<S: LayerSealer>(
        &self,
        inner: Packet,
        destination: &NextHop,
        sealer: &S,
    ) -> Result<(NextHop, Packet)> {
        let mut current = inner;
        let mut next = destination.clone();

        for hop in self.hops.iter().rev() {
            let payload = sealer.seal(&hop.relay, current.as_bytes())?;
            let record = RelayRequest {
                id: hop.id,
                hashcash: hop.hashcash.clone(),
                delay: hop.delay,
                next_hop: next,
                payload,
            };
            let padding = vec![0u8; self.min_size.saturating_sub(record.encoded_len())];
            current = record.to_packet(self.version, &padding)?;
            next = hop.relay.clone();
        }

        Ok((next, current))
    }
}
