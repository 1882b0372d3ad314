//! Session handler: one registration, from the first byte to the ACK.
//!
//! The flow is:
//!   1. Decode a REGISTER frame from the stream
//!   2. Find or create the player record for the connection's identity
//!   3. Store the new tag and avatar
//!   4. Send the ACK carrying the player id and spawn position
//!
//! Steps 2 to 4 are also available on their own as
//! [`complete_registration`], for callers that decode the frame
//! themselves and want to decide whether to go on.
//!
//! The handler never holds the registry lock across an await. Each
//! registry call is a short, synchronous critical section that finishes
//! before the next network read or write starts.

use plaza_protocol::{
    Ack, DecodeLimits, IdentityKey, Registration, read_registration,
};
use plaza_registry::{PlayerRecord, PlayerRegistry};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::PlazaError;

/// Drives one registration over `stream` and returns the committed record.
///
/// On any error nothing has been written to the stream. If decoding
/// failed, the registry wasn't touched either; if the registry refused the
/// player, any record it holds is unchanged.
///
/// # Errors
/// - [`PlazaError::Decode`] for malformed input, a peer close mid-message
///   or an allocation failure while reading.
/// - [`PlazaError::Registry`] if the registry is full or can't store the
///   avatar.
/// - [`PlazaError::Io`] if the ACK can't be written.
pub async fn handle_registration<S>(
    stream: &mut S,
    identity: IdentityKey,
    registry: &PlayerRegistry,
    limits: &DecodeLimits,
) -> Result<PlayerRecord, PlazaError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let registration = read_registration(stream, limits).await?;
    complete_registration(stream, identity, registry, &registration).await
}

/// Stores an already decoded registration and sends the ACK.
///
/// # Errors
/// [`PlazaError::Registry`] or [`PlazaError::Io`], as for
/// [`handle_registration`].
pub async fn complete_registration<S>(
    stream: &mut S,
    identity: IdentityKey,
    registry: &PlayerRegistry,
    registration: &Registration,
) -> Result<PlayerRecord, PlazaError>
where
    S: AsyncWrite + Unpin,
{
    tracing::trace!(
        %identity,
        tag_len = registration.tag.len(),
        width = registration.width,
        height = registration.height,
        "registration decoded"
    );

    registry.ensure(identity)?;
    let record = registry.commit_registration(
        identity,
        &registration.tag,
        &registration.pixels,
        registration.width,
        registration.height,
        registration.format,
    )?;

    let ack = Ack {
        player_id: record.player_id,
        position: record.position,
    };
    stream.write_all(&ack.encode()).await?;
    stream.flush().await?;

    Ok(record)
}
