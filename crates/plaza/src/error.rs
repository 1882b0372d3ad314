//! Unified error type for the Plaza server.

use std::time::Duration;

use plaza_protocol::DecodeError;
use plaza_registry::RegistryError;
use plaza_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
///
/// Apart from [`PlazaError::Transport`] during startup, every variant is
/// local to one connection: the reactor logs it, closes that connection
/// and keeps serving the others.
#[derive(Debug, thiserror::Error)]
pub enum PlazaError {
    /// A transport-level error (bind, accept, send).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Reading a registration failed, including the peer going away.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The registry refused the player (full, bad avatar, out of memory).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A registration started arriving but didn't finish in time.
    #[error("registration stalled mid-message")]
    ReadTimeout,

    /// The client connected but never sent a registration.
    #[error("no registration within {0:?}")]
    HandshakeTimeout(Duration),

    /// The reactor task panicked or was cancelled.
    #[error("reactor task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),

    /// Socket-level I/O outside the transport wrapper.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlazaError {
    /// Returns `true` if this is an ordinary disconnect rather than a
    /// failure worth reporting.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, Self::Decode(DecodeError::PeerClosed))
    }
}

#[cfg(test)]
mod tests {
    use plaza_protocol::ProtocolError;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::AcceptFailed(std::io::Error::other("gone"));
        let plaza_err: PlazaError = err.into();
        assert!(matches!(plaza_err, PlazaError::Transport(_)));
        assert!(plaza_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_decode_error() {
        let err = DecodeError::from(ProtocolError::UnsupportedChannels(2));
        let plaza_err: PlazaError = err.into();
        assert!(matches!(plaza_err, PlazaError::Decode(_)));
        assert!(plaza_err.to_string().contains("channel count 2"));
    }

    #[test]
    fn test_from_registry_error() {
        let err = RegistryError::CapacityExceeded { capacity: 32 };
        let plaza_err: PlazaError = err.into();
        assert!(matches!(plaza_err, PlazaError::Registry(_)));
    }

    #[test]
    fn test_is_peer_closed_only_for_clean_disconnect() {
        assert!(PlazaError::from(DecodeError::PeerClosed).is_peer_closed());
        assert!(!PlazaError::ReadTimeout.is_peer_closed());
        assert!(
            !PlazaError::from(DecodeError::Io(std::io::Error::other("x")))
                .is_peer_closed()
        );
    }

    #[test]
    fn test_handshake_timeout_display_includes_duration() {
        let err = PlazaError::HandshakeTimeout(Duration::from_secs(3));
        assert_eq!(err.to_string(), "no registration within 3s");
    }
}
