//! SAM client errors

use crate::session::SessionState;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using SamError
pub type Result<T> = std::result::Result<T, SamError>;

/// SAM client errors
#[derive(Debug, Error)]
pub enum SamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Router does not support SAM version {min}..{max}")]
    VersionMismatch { min: String, max: String },
    #[error("Handshake failed: {0}")]
    Handshake(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Control line longer than {0} bytes")]
    LineTooLong(usize),
    #[error("Invalid address: {0}")]
    AddressInvalid(String),
    #[error("Cannot send to non-i2p network: {0}")]
    UnsupportedNetwork(String),
    #[error("Name not found: {0}")]
    NotFound(String),
    #[error("Lookup of {name} failed: {source}")]
    LookupFailed {
        name: String,
        #[source]
        source: Box<SamError>,
    },
    #[error("Stream connect rejected: {0}")]
    ConnectRejected(String),
    #[error("Session is {state}, expected {expected}")]
    InvalidState {
        state: SessionState,
        expected: &'static str,
    },
    #[error("No destination keys loaded")]
    NoKeys,
    #[error("Datagram payload of {needed} bytes does not fit buffer of {capacity}")]
    DatagramOverflow { needed: usize, capacity: usize },
    #[error("Keyfile {} is corrupt: {reason}", path.display())]
    KeyfileCorrupt { path: PathBuf, reason: String },
    #[error("Operation timed out")]
    Timeout,
    #[error("Connection closed")]
    ConnectionClosed,
}
