//! Core protocol types shared by every layer above the transport.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player's numeric identifier, as carried in the ACK frame.
///
/// Assigned once by the registry and never reused for the life of the
/// process, so a reconnecting client sees the same value again.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// The key a client is known by in the registry.
///
/// Derived from the peer's IP address only. The source port changes on
/// every reconnect, the host doesn't, so the same machine always lands on
/// the same record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct IdentityKey(IpAddr);

impl IdentityKey {
    /// Derives the identity for a connection from its peer address.
    ///
    /// IPv4-mapped IPv6 addresses are folded into plain IPv4 so that a
    /// dual-stack listener doesn't split one host into two identities.
    pub fn from_peer(peer: SocketAddr) -> Self {
        Self(peer.ip().to_canonical())
    }

    /// Returns the IP address behind this identity.
    pub fn ip(&self) -> IpAddr {
        self.0
    }
}

impl From<IpAddr> for IdentityKey {
    fn from(ip: IpAddr) -> Self {
        Self(ip.to_canonical())
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A spawn coordinate, in screen units.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize,
    Deserialize,
)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

/// First byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Client → Server: tag and avatar.
    Register = 0x01,
    /// Server → Client: assigned player id and position.
    Ack = 0x81,
    /// Server → Client: the server is going away.
    Shutdown = 0xFF,
}

impl Opcode {
    /// Returns the wire byte for this opcode.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(Self::Register),
            0x81 => Ok(Self::Ack),
            0xFF => Ok(Self::Shutdown),
            other => Err(other),
        }
    }
}

// ---------------------------------------------------------------------------
// PixelFormat
// ---------------------------------------------------------------------------

/// Channel layout of a submitted avatar.
///
/// Only these three layouts exist on the wire; anything else is rejected
/// while the header is validated, so code past the codec never sees an
/// unknown channel count.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum PixelFormat {
    /// One byte per pixel, brightness.
    Gray,
    /// Three bytes per pixel, no alpha.
    Rgb,
    /// Four bytes per pixel.
    Rgba,
}

impl PixelFormat {
    /// Bytes per pixel for this layout.
    pub fn channels(self) -> u8 {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }
}

impl TryFrom<u8> for PixelFormat {
    type Error = ProtocolError;

    fn try_from(channels: u8) -> Result<Self, Self::Error> {
        match channels {
            1 => Ok(Self::Gray),
            3 => Ok(Self::Rgb),
            4 => Ok(Self::Rgba),
            other => Err(ProtocolError::UnsupportedChannels(other)),
        }
    }
}
