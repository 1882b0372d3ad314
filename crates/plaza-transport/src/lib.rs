//! Transport layer for Plaza.
//!
//! Wraps Tokio's TCP primitives into the two pieces the server needs:
//!
//! - [`TcpTransport`]: the listening socket. Binds, reports its local
//!   address, and hands out accepted connections.
//! - [`TcpConnection`]: one accepted client. Knows its [`ConnectionId`]
//!   and peer address, can wait for readiness without consuming bytes,
//!   and exposes the underlying stream for the framing codec.
//!
//! The transport knows nothing about messages; it moves bytes.

mod error;
mod tcp;

pub use error::TransportError;
pub use tcp::{Readiness, TcpConnection, TcpTransport};

use std::fmt;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
