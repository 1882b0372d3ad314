//! Error types for the registry layer.

use std::collections::TryReserveError;

use plaza_protocol::IdentityKey;

/// Errors that can occur while creating or updating player records.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The table is full; a new identity can't be admitted.
    /// Existing records are never evicted to make room.
    #[error("registry full ({capacity} players)")]
    CapacityExceeded { capacity: usize },

    /// No record exists for this identity.
    #[error("no player registered for {0}")]
    NotFound(IdentityKey),

    /// The pixel buffer doesn't match the declared dimensions.
    #[error("avatar buffer is {len} bytes, expected {expected}")]
    AvatarSizeMismatch { len: usize, expected: usize },

    /// The normalized avatar buffer could not be allocated.
    #[error("could not allocate avatar buffer: {0}")]
    ResourceExhaustion(#[from] TryReserveError),
}
