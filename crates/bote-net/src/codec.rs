//! Line codec for the SAM control protocol
//!
//! Commands and replies are single newline-terminated lines of
//! space-separated tokens, most of them `KEY=VALUE`.

use crate::error::SamError;
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum reply line (destinations with key certificates run to ~1 KiB)
pub const MAX_LINE_LEN: usize = 16 * 1024;

/// Session style
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Style {
    Stream,
    Datagram,
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream => f.write_str("STREAM"),
            Self::Datagram => f.write_str("DATAGRAM"),
        }
    }
}

/// A control command
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    Hello {
        min: String,
        max: String,
    },
    SessionCreate {
        style: Style,
        id: String,
        /// Private key material
        destination: String,
        /// Where the router forwards datagrams
        forward: Option<(String, u16)>,
    },
    StreamConnect {
        id: String,
        destination: String,
    },
    StreamAccept {
        id: String,
    },
    NamingLookup {
        name: String,
    },
    DestGenerate,
}

impl Command {
    /// Verb for logs; never includes key material
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "HELLO VERSION",
            Self::SessionCreate { .. } => "SESSION CREATE",
            Self::StreamConnect { .. } => "STREAM CONNECT",
            Self::StreamAccept { .. } => "STREAM ACCEPT",
            Self::NamingLookup { .. } => "NAMING LOOKUP",
            Self::DestGenerate => "DEST GENERATE",
        }
    }

    /// The command line without its terminator
    pub fn to_line(&self) -> String {
        match self {
            Self::Hello { min, max } => format!("HELLO VERSION MIN={} MAX={}", min, max),
            Self::SessionCreate {
                style,
                id,
                destination,
                forward,
            } => {
                let mut line = format!(
                    "SESSION CREATE STYLE={} ID={} DESTINATION={}",
                    style, id, destination
                );
                if let Some((host, port)) = forward {
                    line.push_str(&format!(" HOST={} PORT={}", host, port));
                }
                line
            }
            Self::StreamConnect { id, destination } => format!(
                "STREAM CONNECT ID={} DESTINATION={} SILENT=false",
                id, destination
            ),
            Self::StreamAccept { id } => format!("STREAM ACCEPT ID={} SILENT=false", id),
            Self::NamingLookup { name } => format!("NAMING LOOKUP NAME={}", name),
            Self::DestGenerate => "DEST GENERATE".to_string(),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({})", self.name())
    }
}

/// A reply line, terminator stripped
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    line: String,
}

impl Reply {
    pub fn new(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.line.split_whitespace()
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.line.starts_with(prefix)
    }

    /// Value of the first `KEY=` token
    pub fn value(&self, key: &str) -> Option<&str> {
        self.tokens().find_map(|t| {
            t.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

/// Codec for SAM control lines
#[derive(Debug, Default)]
pub struct ControlCodec {
    /// Bytes already searched for a terminator
    scanned: usize,
}

impl ControlCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for ControlCodec {
    type Item = Reply;
    type Error = SamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let newline = src[self.scanned..].iter().position(|b| *b == b'\n');

        let Some(offset) = newline else {
            if src.len() > MAX_LINE_LEN {
                return Err(SamError::LineTooLong(MAX_LINE_LEN));
            }
            self.scanned = src.len();
            return Ok(None);
        };

        let end = self.scanned + offset;
        self.scanned = 0;
        if end > MAX_LINE_LEN {
            return Err(SamError::LineTooLong(MAX_LINE_LEN));
        }

        let raw = src.split_to(end);
        src.advance(1);

        let line = std::str::from_utf8(&raw)
            .map_err(|_| SamError::Protocol("reply is not valid UTF-8".into()))?;
        Ok(Some(Reply::new(line.trim_end_matches('\r'))))
    }
}

impl Encoder<Command> for ControlCodec {
    type Error = SamError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.to_line();
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_lines() {
        let mut codec = ControlCodec::new();
        let mut buf = BytesMut::from(&b"HELLO REPLY RESULT=OK VERSION=3.0\nSTREAM"[..]);

        let reply = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(reply.line(), "HELLO REPLY RESULT=OK VERSION=3.0");
        assert_eq!(reply.value("RESULT"), Some("OK"));
        assert_eq!(reply.value("VERSION"), Some("3.0"));
        assert_eq!(reply.value("MISSING"), None);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b" STATUS RESULT=OK\r\n");
        let reply = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(reply.line(), "STREAM STATUS RESULT=OK");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_value_requires_exact_key() {
        let reply = Reply::new("NAMING REPLY RESULT=OK NAME=foo VALUE=abc123");
        assert_eq!(reply.value("NAME"), Some("foo"));
        assert_eq!(reply.value("VAL"), None);
        assert_eq!(reply.value("VALUE"), Some("abc123"));
    }

    #[test]
    fn test_line_too_long() {
        let mut codec = ControlCodec::new();
        let mut buf = BytesMut::from(vec![b'a'; MAX_LINE_LEN + 1].as_slice());
        assert!(matches!(
            codec.decode(&mut buf),
            Err(SamError::LineTooLong(_))
        ));
    }

    #[test]
    fn test_line_too_long_with_terminator() {
        let mut codec = ControlCodec::new();
        let mut line = vec![b'a'; MAX_LINE_LEN + 1];
        line.push(b'\n');
        let mut buf = BytesMut::from(line.as_slice());
        assert!(matches!(
            codec.decode(&mut buf),
            Err(SamError::LineTooLong(_))
        ));

        let mut line = vec![b'a'; MAX_LINE_LEN];
        line.push(b'\n');
        let mut buf = BytesMut::from(line.as_slice());
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().line().len(), MAX_LINE_LEN);
    }

    #[test]
    fn test_encode_commands() {
        let mut codec = ControlCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(
                Command::Hello {
                    min: "3.0".into(),
                    max: "3.1".into(),
                },
                &mut buf,
            )
            .unwrap();
        assert_eq!(&buf[..], b"HELLO VERSION MIN=3.0 MAX=3.1\n");
    }

    #[test]
    fn test_session_create_lines() {
        let stream = Command::SessionCreate {
            style: Style::Stream,
            id: "bote".into(),
            destination: "PRIV".into(),
            forward: None,
        };
        assert_eq!(
            stream.to_line(),
            "SESSION CREATE STYLE=STREAM ID=bote DESTINATION=PRIV"
        );

        let datagram = Command::SessionCreate {
            style: Style::Datagram,
            id: "bote".into(),
            destination: "PRIV".into(),
            forward: Some(("127.0.0.1".into(), 40000)),
        };
        assert_eq!(
            datagram.to_line(),
            "SESSION CREATE STYLE=DATAGRAM ID=bote DESTINATION=PRIV HOST=127.0.0.1 PORT=40000"
        );
        assert!(!format!("{:?}", datagram).contains("PRIV"));
    }

    #[test]
    fn test_stream_lines() {
        assert_eq!(
            Command::StreamConnect {
                id: "s".into(),
                destination: "abc".into()
            }
            .to_line(),
            "STREAM CONNECT ID=s DESTINATION=abc SILENT=false"
        );
        assert_eq!(
            Command::StreamAccept { id: "s".into() }.to_line(),
            "STREAM ACCEPT ID=s SILENT=false"
        );
        assert_eq!(
            Command::NamingLookup { name: "x.i2p".into() }.to_line(),
            "NAMING LOOKUP NAME=x.i2p"
        );
    }
}
