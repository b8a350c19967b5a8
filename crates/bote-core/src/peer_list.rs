//! Peer list request: a single 32-byte lookup key

use crate::error::{Error, Result};
use crate::packet::{Packet, PacketType};
use crate::types::{ContentId, ID_LEN};
use serde::{Deserialize, Serialize};

/// Request for the peers a node knows about
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerListRequest {
    pub content_id: ContentId,
}

impl PeerListRequest {
    pub fn new(content_id: ContentId) -> Self {
        Self { content_id }
    }

    /// Decode a body, which must be exactly one identifier long.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let id: [u8; ID_LEN] = body.try_into().map_err(|_| Error::InvalidSize {
            expected: ID_LEN,
            actual: body.len(),
        })?;
        Ok(Self {
            content_id: ContentId(id),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        self.content_id.0.to_vec()
    }

    pub fn to_packet(&self, version: u8) -> Packet {
        Packet::new(version, PacketType::PeerListRequest, &self.content_id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_sizes() {
        assert_eq!(
            PeerListRequest::decode(&[0u8; 31]),
            Err(Error::InvalidSize {
                expected: 32,
                actual: 31
            })
        );
        assert_eq!(
            PeerListRequest::decode(&[0u8; 33]),
            Err(Error::InvalidSize {
                expected: 32,
                actual: 33
            })
        );
    }

    #[test]
    fn test_exact_size_returns_identifier() {
        let mut id = [0u8; 32];
        for (i, b) in id.iter_mut().enumerate() {
            *b = i as u8;
        }
        let req = PeerListRequest::decode(&id).unwrap();
        assert_eq!(req.content_id.0, id);
        assert_eq!(req.encode(), id.to_vec());
    }

    #[test]
    fn test_to_packet() {
        let req = PeerListRequest::new(ContentId([7; 32]));
        let pkt = Packet::parse(req.to_packet(4).as_bytes()).unwrap();
        assert_eq!(pkt.as_peer_list_request().unwrap(), Some(req));
    }

    #[test]
    fn test_packet_body_wrong_size() {
        let pkt = Packet::new(4, PacketType::PeerListRequest, &[0u8; 33]);
        assert!(matches!(
            pkt.as_peer_list_request(),
            Err(Error::InvalidSize { actual: 33, .. })
        ));
    }
}
