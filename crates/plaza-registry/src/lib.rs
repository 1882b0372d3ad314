//! Player registry for Plaza.
//!
//! Holds one [`PlayerRecord`] per client identity for the life of the
//! process. The server's session handlers write to it; a presentation
//! consumer reads point-in-time copies through
//! [`PlayerRegistry::snapshot_all`].
//!
//! Records are created on first contact, updated on every successful
//! registration, and flagged disconnected when the last session for their
//! identity closes. They are never removed.

mod avatar;
mod error;
mod record;
mod registry;

pub use avatar::normalize_to_rgba;
pub use error::RegistryError;
pub use record::{Avatar, PlayerRecord, RegistryConfig, SpawnArea};
pub use registry::PlayerRegistry;
