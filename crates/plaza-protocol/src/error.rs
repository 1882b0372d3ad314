//! Error types for the protocol layer.
//!
//! Decoding can fail in two very different ways, and callers react to
//! them differently:
//!
//! - [`ProtocolError`]: the peer sent something that breaks the wire
//!   rules. The connection is closed and nothing is committed.
//! - [`DecodeError`]: everything that can stop a decode, including the
//!   peer simply going away ([`DecodeError::PeerClosed`]), which is a
//!   normal disconnect rather than misbehaviour.

use std::collections::TryReserveError;

/// A registration that violates the wire rules.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The first byte was not the opcode the reader expected.
    #[error("unexpected opcode {found:#04x}, expected {expected:#04x}")]
    UnexpectedOpcode { expected: u8, found: u8 },

    /// The declared tag length exceeds the allowed maximum.
    #[error("tag length {len} exceeds maximum {max}")]
    TagTooLong { len: usize, max: usize },

    /// Width or height is zero or larger than the configured maximum.
    #[error("avatar dimensions {width}x{height} outside 1..={max}")]
    InvalidDimensions { width: u32, height: u32, max: u32 },

    /// The channel count is not 1, 3 or 4.
    #[error("unsupported channel count {0}")]
    UnsupportedChannels(u8),

    /// The declared avatar byte length doesn't match the dimensions.
    #[error("avatar length {declared} does not match expected {expected}")]
    AvatarLengthMismatch { declared: u32, expected: u64 },

    /// The tag bytes are not valid UTF-8.
    #[error("tag is not valid UTF-8: {0}")]
    InvalidTag(#[from] std::string::FromUtf8Error),
}

/// Any failure while reading a message off a stream.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The message broke a protocol rule.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The peer closed the stream before a full message arrived.
    #[error("peer closed the connection")]
    PeerClosed,

    /// A tag or avatar buffer could not be allocated.
    #[error("could not allocate message buffer: {0}")]
    ResourceExhaustion(#[from] TryReserveError),

    /// The underlying reader failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    /// Maps a `read_exact` failure, treating EOF as a peer close.
    pub(crate) fn from_read(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::PeerClosed
        } else {
            Self::Io(err)
        }
    }
}
