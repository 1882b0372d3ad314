//! Wire protocol for Plaza.
//!
//! This crate defines the "language" clients and the server speak:
//!
//! - **Types** ([`PlayerId`], [`IdentityKey`], [`Position`],
//!   [`PixelFormat`], [`Opcode`]): the values that travel on the wire or
//!   key the registry.
//! - **Codec** ([`read_registration`], [`Ack`], [`encode_shutdown`]):
//!   how those values become bytes and back.
//! - **Errors** ([`ProtocolError`], [`DecodeError`]): what can go wrong
//!   while decoding.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Registration / Ack) → Registry (records)
//! ```
//!
//! The codec doesn't know about sockets or players; it reads from any
//! `AsyncRead` and produces plain values.

mod codec;
mod error;
mod types;

pub use codec::{
    ACK_FRAME_LEN, Ack, DecodeLimits, REGISTER_HEADER_LEN, RegisterHeader,
    Registration, TAG_LEN_CEILING, encode_shutdown, read_registration,
};
pub use error::{DecodeError, ProtocolError};
pub use types::{IdentityKey, Opcode, PixelFormat, PlayerId, Position};
