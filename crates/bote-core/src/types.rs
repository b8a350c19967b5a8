//! Fixed-size identifiers carried in request bodies

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of correlation and content identifiers.
pub const ID_LEN: usize = 32;

/// Length of a raw next-hop destination (public key and signing key, no certificate).
pub const NEXT_HOP_LEN: usize = 384;

/// Correlation ID tying a relayed request to its eventual response
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CorrelationId(pub [u8; ID_LEN]);

/// Content identifier used as a lookup key
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ContentId(pub [u8; ID_LEN]);

/// Raw destination of the next relay hop
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NextHop(pub [u8; NEXT_HOP_LEN]);

impl CorrelationId {
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }
}

impl ContentId {
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }
}

impl NextHop {
    /// Build from a slice that must be exactly [`NEXT_HOP_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; NEXT_HOP_LEN] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; NEXT_HOP_LEN] {
        &self.0
    }
}

impl Default for NextHop {
    fn default() -> Self {
        Self([0; NEXT_HOP_LEN])
    }
}

impl fmt::Debug for NextHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NextHop({})", self)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for NextHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}
