//! Error types for the bote wire format

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Wire format errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Buffer shorter than the structure it should contain
    #[error("packet is too small")]
    TooSmall,

    /// First four bytes are not the packet magic
    #[error("bad packet header")]
    BadHeader,

    /// Fixed-size body with the wrong length
    #[error("invalid packet size: expected {expected} bytes, got {actual}")]
    InvalidSize { expected: usize, actual: usize },

    /// Variable-length field does not fit its 16-bit length prefix
    #[error("{field} too long: {len} bytes (max 65535)")]
    FieldTooLong { field: &'static str, len: usize },

    /// Layer sealing failed in the crypto component
    #[error("seal failed: {0}")]
    Seal(String),
}
