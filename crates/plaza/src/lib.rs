//! # Plaza
//!
//! A small avatar-registration server. Clients connect over TCP, send one
//! binary REGISTER frame with a display tag and a tiny avatar image, and
//! get back an ACK with their player id and spawn position. The server
//! keeps every player it has ever seen in a shared [`PlayerRegistry`]
//! that a renderer can snapshot at any time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use plaza::prelude::*;
//!
//! # async fn run() -> Result<(), PlazaError> {
//! let server = PlazaServer::builder()
//!     .bind("127.0.0.1:7777")
//!     .build()
//!     .await?;
//! let handle = server.start();
//!
//! for player in handle.registry().snapshot_all() {
//!     println!("{} at {}", player.player_id, player.position);
//! }
//!
//! handle.shutdown().await
//! # }
//! ```

mod config;
mod connection;
mod error;
mod handler;
mod reactor;
mod server;

pub use config::ServerConfig;
pub use connection::ConnectionState;
pub use error::PlazaError;
pub use handler::{complete_registration, handle_registration};
pub use server::{PlazaServer, PlazaServerBuilder, ServerHandle};

pub use plaza_protocol as protocol;
pub use plaza_registry as registry;
pub use plaza_transport as transport;

pub use plaza_registry::PlayerRegistry;

/// Everything a server binary or test usually needs.
pub mod prelude {
    pub use crate::{
        ConnectionState, PlazaError, PlazaServer, PlazaServerBuilder,
        ServerConfig, ServerHandle,
    };
    pub use plaza_protocol::{
        Ack, DecodeLimits, IdentityKey, PixelFormat, PlayerId, Position,
        Registration,
    };
    pub use plaza_registry::{
        Avatar, PlayerRecord, PlayerRegistry, RegistryConfig, SpawnArea,
    };
}
