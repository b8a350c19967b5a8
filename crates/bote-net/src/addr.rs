//! I2P destination addresses

use crate::error::{Result, SamError};
use base64::alphabet::Alphabet;
use base64::engine::general_purpose::PAD;
use base64::engine::{DecodePaddingMode, GeneralPurpose};
use base64::Engine;
use bote_core::types::{NextHop, NEXT_HOP_LEN};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

const I2P_ALPHABET: Alphabet =
    match Alphabet::new("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-~") {
        Ok(alphabet) => alphabet,
        Err(_) => panic!("invalid i2p base64 alphabet"),
    };

/// Base64 with the I2P alphabet (`-` and `~` instead of `+` and `/`)
pub const I2P_BASE64: GeneralPurpose = GeneralPurpose::new(
    &I2P_ALPHABET,
    PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Null certificate appended to a bare 384-byte destination
const NULL_CERT: [u8; 3] = [0, 0, 0];

/// Network name of I2P addresses
pub const I2P_NETWORK: &str = "i2p";

/// An I2P destination in I2P base64
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Addr(String);

impl Addr {
    /// Wrap an encoded destination, checking only the character set.
    pub fn new(encoded: impl Into<String>) -> Result<Self> {
        let encoded = encoded.into();
        let valid = !encoded.is_empty()
            && encoded
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'~' | b'='));
        if !valid {
            return Err(SamError::AddressInvalid(encoded));
        }
        Ok(Self(encoded))
    }

    /// Encode raw destination bytes.
    pub fn from_bytes(raw: &[u8]) -> Self {
        Self(I2P_BASE64.encode(raw))
    }

    /// A bare next-hop destination with a null certificate.
    pub fn from_next_hop(hop: &NextHop) -> Self {
        let mut raw = Vec::with_capacity(NEXT_HOP_LEN + NULL_CERT.len());
        raw.extend_from_slice(hop.as_bytes());
        raw.extend_from_slice(&NULL_CERT);
        Self::from_bytes(&raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn network(&self) -> &'static str {
        I2P_NETWORK
    }

    /// Decode to raw destination bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        I2P_BASE64
            .decode(&self.0)
            .map_err(|e| SamError::AddressInvalid(format!("{}: {}", self.short(), e)))
    }

    /// Public and signing key part, as carried in relay records.
    pub fn next_hop(&self) -> Result<NextHop> {
        let raw = self.to_bytes()?;
        if raw.len() < NEXT_HOP_LEN {
            return Err(SamError::AddressInvalid(format!(
                "{}: {} bytes is shorter than a destination",
                self.short(),
                raw.len()
            )));
        }
        NextHop::from_slice(&raw[..NEXT_HOP_LEN])
            .ok_or_else(|| SamError::AddressInvalid(self.short().to_string()))
    }

    /// Short `.b32.i2p` form: base32 of the SHA-256 of the raw destination.
    pub fn base32(&self) -> Result<String> {
        let digest = Sha256::digest(self.to_bytes()?);
        Ok(format!("{}.b32.i2p", base32_encode(&digest)))
    }

    /// Leading characters, for logs
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

/// Unpadded lowercase RFC 4648 base32
fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1F) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1F) as usize] as char);
    }
    out
}

impl FromStr for Addr {
    type Err = SamError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Addr({}..)", self.short())
    }
}

/// Destination of an outgoing datagram
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerAddr {
    I2p(Addr),
    Ip(SocketAddr),
}

impl PeerAddr {
    pub fn network(&self) -> &'static str {
        match self {
            Self::I2p(_) => I2P_NETWORK,
            Self::Ip(_) => "ip",
        }
    }
}

impl From<Addr> for PeerAddr {
    fn from(addr: Addr) -> Self {
        Self::I2p(addr)
    }
}

impl From<SocketAddr> for PeerAddr {
    fn from(addr: SocketAddr) -> Self {
        Self::Ip(addr)
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2p(a) => write!(f, "{}", a),
            Self::Ip(a) => write!(f, "{}", a),
        }
    }
}
