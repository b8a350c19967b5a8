//! Packet framing for the peer protocol
//!
//! Wire format:
//! - 4 bytes: magic `6D 30 52 E9`
//! - 1 byte: protocol version
//! - 1 byte: packet type
//! - N bytes: type-specific body

use crate::error::{Error, Result};
use crate::peer_list::PeerListRequest;
use crate::relay::RelayRequest;
use serde::{Deserialize, Serialize};

/// Packet magic
pub const MAGIC: [u8; 4] = [0x6D, 0x30, 0x52, 0xE9];

/// Protocol version written by this node
pub const PROTOCOL_VERSION: u8 = 4;

/// Magic, version and type byte
pub const HEADER_LEN: usize = 6;

const VERSION_OFFSET: usize = 4;
const TYPE_OFFSET: usize = 5;

/// Packet type tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketType {
    /// Fetch a stored item
    FetchRequest,
    /// Response to a request
    Response,
    /// Ask a peer for its known peers
    PeerListRequest,
    /// One hop of a relay chain
    RelayRequest,
    /// Unrecognized tag, kept for diagnostics
    Unknown(u8),
}

impl PacketType {
    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::FetchRequest => "FetchRequest",
            Self::Response => "Response",
            Self::PeerListRequest => "PeerListRequest",
            Self::RelayRequest => "RelayRequest",
            Self::Unknown(_) => "Unknown",
        }
    }

    pub fn byte(&self) -> u8 {
        u8::from(*self)
    }
}

impl From<u8> for PacketType {
    fn from(value: u8) -> Self {
        match value {
            0x46 => Self::FetchRequest,
            0x4E => Self::Response,
            0x41 => Self::PeerListRequest,
            0x52 => Self::RelayRequest,
            other => Self::Unknown(other),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(value: PacketType) -> Self {
        match value {
            PacketType::FetchRequest => 0x46,
            PacketType::Response => 0x4E,
            PacketType::PeerListRequest => 0x41,
            PacketType::RelayRequest => 0x52,
            PacketType::Unknown(b) => b,
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A framed packet. Always holds at least a full header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    raw: Vec<u8>,
}

/// A packet decoded one level deep.
///
/// Relay payloads stay opaque: only the hop that can decrypt them decodes
/// the next layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    FetchRequest(Vec<u8>),
    Response(Vec<u8>),
    PeerListRequest(PeerListRequest),
    RelayRequest(RelayRequest),
    Unknown(u8),
}

impl Packet {
    /// Parse a packet, copying the input so the caller may reuse its buffer.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() <= HEADER_LEN {
            return Err(Error::TooSmall);
        }
        if data[..4] != MAGIC {
            return Err(Error::BadHeader);
        }
        Ok(Self { raw: data.to_vec() })
    }

    /// Frame a payload. The payload is not validated.
    pub fn new(version: u8, packet_type: PacketType, payload: &[u8]) -> Self {
        let mut raw = Vec::with_capacity(HEADER_LEN + payload.len());
        raw.extend_from_slice(&MAGIC);
        raw.push(version);
        raw.push(packet_type.byte());
        raw.extend_from_slice(payload);
        Self { raw }
    }

    pub fn packet_type(&self) -> PacketType {
        PacketType::from(self.raw[TYPE_OFFSET])
    }

    pub fn version(&self) -> u8 {
        self.raw[VERSION_OFFSET]
    }

    /// Body after the header
    pub fn body(&self) -> &[u8] {
        &self.raw[HEADER_LEN..]
    }

    /// Full wire bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Decode the type-specific body.
    pub fn message(&self) -> Result<Message> {
        let message = match self.packet_type() {
            PacketType::FetchRequest => Message::FetchRequest(self.body().to_vec()),
            PacketType::Response => Message::Response(self.body().to_vec()),
            PacketType::PeerListRequest => {
                Message::PeerListRequest(PeerListRequest::decode(self.body())?)
            }
            PacketType::RelayRequest => Message::RelayRequest(RelayRequest::decode(self.body())?),
            PacketType::Unknown(b) => Message::Unknown(b),
        };
        Ok(message)
    }

    /// Body as a peer list request, `None` if this is another packet type.
    pub fn as_peer_list_request(&self) -> Result<Option<PeerListRequest>> {
        if self.packet_type() != PacketType::PeerListRequest {
            return Ok(None);
        }
        PeerListRequest::decode(self.body()).map(Some)
    }

    /// Body as a relay request, `None` if this is another packet type.
    pub fn as_relay_request(&self) -> Result<Option<RelayRequest>> {
        if self.packet_type() != PacketType::RelayRequest {
            return Ok(None);
        }
        RelayRequest::decode(self.body()).map(Some)
    }
}

impl Message {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::FetchRequest(_) => PacketType::FetchRequest,
            Self::Response(_) => PacketType::Response,
            Self::PeerListRequest(_) => PacketType::PeerListRequest,
            Self::RelayRequest(_) => PacketType::RelayRequest,
            Self::Unknown(b) => PacketType::Unknown(*b),
        }
    }
}
