//! Binary framing codec.
//!
//! Every multi-byte integer on the wire is big-endian. A registration
//! looks like this:
//!
//! ```text
//! +--------+---------+--------+--------+----------+------------+-----+--------+
//! | opcode | tag_len | width  | height | channels | avatar_len | tag | pixels |
//! |   u8   |   u16   |  u32   |  u32   |    u8    |    u32     |     |        |
//! +--------+---------+--------+--------+----------+------------+-----+--------+
//! ```
//!
//! The fixed part after the opcode is [`REGISTER_HEADER_LEN`] bytes and is
//! fully validated before any variable-length payload is allocated or
//! read, so a hostile length field can't make the server allocate more
//! than the limits allow.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    DecodeError, Opcode, PixelFormat, PlayerId, Position, ProtocolError,
};

/// Hard ceiling on a declared tag length, whatever the configuration says.
pub const TAG_LEN_CEILING: u16 = 1024;

/// Size of the fixed registration header that follows the opcode.
pub const REGISTER_HEADER_LEN: usize = 15;

/// Size of an encoded ACK frame.
pub const ACK_FRAME_LEN: usize = 13;

// ---------------------------------------------------------------------------
// DecodeLimits
// ---------------------------------------------------------------------------

/// Bounds applied to a registration header before its payload is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeLimits {
    /// Largest accepted tag length in bytes. Capped at
    /// [`TAG_LEN_CEILING`].
    pub max_tag_len: u16,

    /// Largest accepted avatar width or height in pixels.
    pub max_avatar_dim: u32,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_tag_len: TAG_LEN_CEILING,
            max_avatar_dim: 8,
        }
    }
}

// ---------------------------------------------------------------------------
// RegisterHeader
// ---------------------------------------------------------------------------

/// The fixed-size part of a REGISTER frame, as declared by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterHeader {
    pub tag_len: u16,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub avatar_len: u32,
}

impl RegisterHeader {
    /// Splits the header bytes into fields. Never fails; validation is a
    /// separate step.
    pub fn parse(buf: &[u8; REGISTER_HEADER_LEN]) -> Self {
        Self {
            tag_len: u16::from_be_bytes([buf[0], buf[1]]),
            width: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
            height: u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]),
            channels: buf[10],
            avatar_len: u32::from_be_bytes([
                buf[11], buf[12], buf[13], buf[14],
            ]),
        }
    }

    /// Serializes the header fields in wire order.
    pub fn encode(&self) -> [u8; REGISTER_HEADER_LEN] {
        let mut out = [0u8; REGISTER_HEADER_LEN];
        out[0..2].copy_from_slice(&self.tag_len.to_be_bytes());
        out[2..6].copy_from_slice(&self.width.to_be_bytes());
        out[6..10].copy_from_slice(&self.height.to_be_bytes());
        out[10] = self.channels;
        out[11..15].copy_from_slice(&self.avatar_len.to_be_bytes());
        out
    }

    /// Checks every declared size against `limits`.
    ///
    /// Returns the pixel format on success so the caller doesn't have to
    /// convert the channel count a second time.
    ///
    /// # Errors
    /// The first violated rule, checked in wire order: tag length,
    /// dimensions, channel count, then avatar length.
    pub fn validate(
        &self,
        limits: &DecodeLimits,
    ) -> Result<PixelFormat, ProtocolError> {
        let max_tag = limits.max_tag_len.min(TAG_LEN_CEILING);
        if self.tag_len > max_tag {
            return Err(ProtocolError::TagTooLong {
                len: self.tag_len as usize,
                max: max_tag as usize,
            });
        }

        let max_dim = limits.max_avatar_dim;
        let dim_ok = |d: u32| d != 0 && d <= max_dim;
        if !dim_ok(self.width) || !dim_ok(self.height) {
            return Err(ProtocolError::InvalidDimensions {
                width: self.width,
                height: self.height,
                max: max_dim,
            });
        }

        let format = PixelFormat::try_from(self.channels)?;

        // Computed in u64: a u32 product can wrap for large dimensions.
        let expected = u64::from(self.width)
            * u64::from(self.height)
            * u64::from(self.channels);
        if u64::from(self.avatar_len) != expected {
            return Err(ProtocolError::AvatarLengthMismatch {
                declared: self.avatar_len,
                expected,
            });
        }

        Ok(format)
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// A fully decoded and validated REGISTER message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub tag: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Raw pixels in `format`, `width * height * channels` bytes.
    pub pixels: Vec<u8>,
}

impl Registration {
    /// Encodes this registration as a client would send it.
    ///
    /// # Errors
    /// [`ProtocolError::TagTooLong`] if the tag doesn't fit the `u16`
    /// length field.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let tag_len = u16::try_from(self.tag.len()).map_err(|_| {
            ProtocolError::TagTooLong {
                len: self.tag.len(),
                max: u16::MAX as usize,
            }
        })?;
        let avatar_len = u32::try_from(self.pixels.len()).map_err(|_| {
            ProtocolError::AvatarLengthMismatch {
                declared: u32::MAX,
                expected: self.pixels.len() as u64,
            }
        })?;
        let header = RegisterHeader {
            tag_len,
            width: self.width,
            height: self.height,
            channels: self.format.channels(),
            avatar_len,
        };

        let mut out = Vec::with_capacity(
            1 + REGISTER_HEADER_LEN + self.tag.len() + self.pixels.len(),
        );
        out.push(Opcode::Register.as_byte());
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(self.tag.as_bytes());
        out.extend_from_slice(&self.pixels);
        Ok(out)
    }
}

/// Reads one REGISTER message from `reader`.
///
/// Short reads are retried by `read_exact` until the declared size is
/// reached. A stream that ends anywhere inside the message (or before its
/// first byte) yields [`DecodeError::PeerClosed`].
///
/// # Errors
/// - [`DecodeError::Protocol`]: wrong opcode or a header rule broken.
///   Nothing past the header has been read in that case.
/// - [`DecodeError::PeerClosed`]: EOF before the message was complete.
/// - [`DecodeError::ResourceExhaustion`]: payload buffer allocation
///   failed.
/// - [`DecodeError::Io`]: the reader failed.
pub async fn read_registration<R>(
    reader: &mut R,
    limits: &DecodeLimits,
) -> Result<Registration, DecodeError>
where
    R: AsyncRead + Unpin,
{
    let opcode = reader.read_u8().await.map_err(DecodeError::from_read)?;
    if opcode != Opcode::Register.as_byte() {
        return Err(ProtocolError::UnexpectedOpcode {
            expected: Opcode::Register.as_byte(),
            found: opcode,
        }
        .into());
    }

    let mut header_buf = [0u8; REGISTER_HEADER_LEN];
    reader
        .read_exact(&mut header_buf)
        .await
        .map_err(DecodeError::from_read)?;
    let header = RegisterHeader::parse(&header_buf);
    let format = header.validate(limits)?;

    let tag_bytes = read_payload(reader, header.tag_len as usize).await?;
    let pixels = read_payload(reader, header.avatar_len as usize).await?;
    let tag = String::from_utf8(tag_bytes).map_err(ProtocolError::from)?;

    Ok(Registration {
        tag,
        width: header.width,
        height: header.height,
        format,
        pixels,
    })
}

/// Allocates exactly `len` bytes and fills them from `reader`.
async fn read_payload<R>(
    reader: &mut R,
    len: usize,
) -> Result<Vec<u8>, DecodeError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)?;
    buf.resize(len, 0);
    reader
        .read_exact(&mut buf)
        .await
        .map_err(DecodeError::from_read)?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Server → client frames
// ---------------------------------------------------------------------------

/// Acknowledgement of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub player_id: PlayerId,
    pub position: Position,
}

impl Ack {
    /// Encodes the ACK frame: opcode, player id, x, y.
    pub fn encode(&self) -> [u8; ACK_FRAME_LEN] {
        let mut out = [0u8; ACK_FRAME_LEN];
        out[0] = Opcode::Ack.as_byte();
        out[1..5].copy_from_slice(&self.player_id.0.to_be_bytes());
        out[5..9].copy_from_slice(&self.position.x.to_be_bytes());
        out[9..13].copy_from_slice(&self.position.y.to_be_bytes());
        out
    }

    /// Decodes an ACK frame, as a client would.
    ///
    /// # Errors
    /// [`ProtocolError::UnexpectedOpcode`] if the first byte isn't ACK.
    pub fn decode(buf: &[u8; ACK_FRAME_LEN]) -> Result<Self, ProtocolError> {
        if buf[0] != Opcode::Ack.as_byte() {
            return Err(ProtocolError::UnexpectedOpcode {
                expected: Opcode::Ack.as_byte(),
                found: buf[0],
            });
        }
        Ok(Self {
            player_id: PlayerId(u32::from_be_bytes([
                buf[1], buf[2], buf[3], buf[4],
            ])),
            position: Position {
                x: i32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]),
                y: i32::from_be_bytes([buf[9], buf[10], buf[11], buf[12]]),
            },
        })
    }
}

/// Encodes the single-byte SHUTDOWN frame.
pub fn encode_shutdown() -> [u8; 1] {
    [Opcode::Shutdown.as_byte()]
}
