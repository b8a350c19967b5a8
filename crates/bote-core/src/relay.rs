//! Relay request: one hop of an onion-style relay chain
//!
//! Body layout (big-endian integers):
//!
//! | offset        | size | field                  |
//! |---------------|------|------------------------|
//! | 0             | 32   | correlation ID         |
//! | 32            | 2    | hashcash length `hcl`  |
//! | 34            | hcl  | hashcash token         |
//! | 34+hcl        | 4    | delay (seconds)        |
//! | 38+hcl        | 384  | next hop destination   |
//! | 422+hcl       | 2    | payload length `dl`    |
//! | 424+hcl       | 1    | unused                 |
//! | 425+hcl       | dl   | encrypted payload      |
//! | 425+hcl+dl    | ..   | padding                |
//!
//! The unused byte between the payload length and the payload is part of the
//! deployed wire format. Do not remove it.

use crate::error::{Error, Result};
use crate::packet::{Packet, PacketType};
use crate::types::{CorrelationId, NextHop, ID_LEN, NEXT_HOP_LEN};
use std::time::Duration;

/// Fixed part of the body: ID, both length fields, delay and next hop.
pub const MIN_BODY_LEN: usize = ID_LEN + 2 + 4 + NEXT_HOP_LEN + 2;

const HASHCASH_LEN_OFFSET: usize = ID_LEN;
const HASHCASH_OFFSET: usize = ID_LEN + 2;
const GAP_LEN: usize = 1;

/// A single relay hop
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayRequest {
    /// Correlation ID
    pub id: CorrelationId,
    /// Opaque proof-of-work token
    pub hashcash: Vec<u8>,
    /// Seconds the relay waits before forwarding
    pub delay: u32,
    /// Where the payload goes next
    pub next_hop: NextHop,
    /// Next packet, sealed for the relay holding this record
    pub payload: Vec<u8>,
}

fn read_u16(body: &[u8], offset: usize) -> usize {
    u16::from_be_bytes([body[offset], body[offset + 1]]) as usize
}

fn read_u32(body: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        body[offset],
        body[offset + 1],
        body[offset + 2],
        body[offset + 3],
    ])
}

fn field_len(field: &'static str, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::FieldTooLong { field, len })
}

impl RelayRequest {
    /// Decode a relay request body. Trailing padding is discarded.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let len = body.len();
        if len < MIN_BODY_LEN {
            return Err(Error::TooSmall);
        }

        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(&body[..ID_LEN]);

        let hcl = read_u16(body, HASHCASH_LEN_OFFSET);
        if len < MIN_BODY_LEN + hcl {
            return Err(Error::TooSmall);
        }
        let hashcash = body[HASHCASH_OFFSET..HASHCASH_OFFSET + hcl].to_vec();

        let delay_offset = HASHCASH_OFFSET + hcl;
        let delay = read_u32(body, delay_offset);

        let next_offset = delay_offset + 4;
        let mut next_hop = NextHop::default();
        next_hop
            .0
            .copy_from_slice(&body[next_offset..next_offset + NEXT_HOP_LEN]);

        let dl_offset = next_offset + NEXT_HOP_LEN;
        let dl = read_u16(body, dl_offset);
        let data_offset = dl_offset + 2 + GAP_LEN;
        if len < data_offset + dl {
            return Err(Error::TooSmall);
        }
        let payload = body[data_offset..data_offset + dl].to_vec();

        Ok(Self {
            id: CorrelationId(id),
            hashcash,
            delay,
            next_hop,
            payload,
        })
    }

    /// Size of the encoded body without padding
    pub fn encoded_len(&self) -> usize {
        MIN_BODY_LEN + GAP_LEN + self.hashcash.len() + self.payload.len()
    }

    /// Encode the body followed by `padding`.
    pub fn encode(&self, padding: &[u8]) -> Result<Vec<u8>> {
        let hcl = field_len("hashcash", self.hashcash.len())?;
        let dl = field_len("payload", self.payload.len())?;

        let mut body = Vec::with_capacity(self.encoded_len() + padding.len());
        body.extend_from_slice(&self.id.0);
        body.extend_from_slice(&hcl.to_be_bytes());
        body.extend_from_slice(&self.hashcash);
        body.extend_from_slice(&self.delay.to_be_bytes());
        body.extend_from_slice(&self.next_hop.0);
        body.extend_from_slice(&dl.to_be_bytes());
        body.extend_from_slice(&[0u8; GAP_LEN]);
        body.extend_from_slice(&self.payload);
        body.extend_from_slice(padding);
        Ok(body)
    }

    pub fn to_packet(&self, version: u8, padding: &[u8]) -> Result<Packet> {
        let body = self.encode(padding)?;
        Ok(Packet::new(version, PacketType::RelayRequest, &body))
    }

    pub fn delay_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.delay))
    }
}
