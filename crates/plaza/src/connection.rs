//! Per-connection bookkeeping owned by the reactor.

use std::fmt;
use std::time::Duration;

use plaza_protocol::IdentityKey;
use plaza_transport::TcpConnection;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// The lifecycle state of a connection.
///
/// Forward transitions are strictly ordered, and any open state may drop
/// straight to `Closed`:
///
/// ```text
/// Accepted → AwaitingHandshake → Established → Closed
///     │              │                ▲
///     └──────────────┴──────→ Closed  └── re-registration
/// ```
///
/// - **Accepted**: the socket exists but isn't tracked yet.
/// - **AwaitingHandshake**: tracked by the reactor, no registration yet.
/// - **Established**: at least one registration succeeded. Further
///   registrations on the same socket replace the avatar.
/// - **Closed**: the socket is shut down and forgotten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    AwaitingHandshake,
    Established,
    Closed,
}

impl ConnectionState {
    /// Returns the next state on the success path, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Accepted => Some(Self::AwaitingHandshake),
            Self::AwaitingHandshake => Some(Self::Established),
            Self::Established => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        match (self, target) {
            (Self::Closed, _) => false,
            (_, Self::Closed) => true,
            (Self::Established, Self::Established) => true,
            _ => self.next() == Some(target),
        }
    }

    /// Returns `true` if the reactor should still service this
    /// connection.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::AwaitingHandshake | Self::Established)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "Accepted"),
            Self::AwaitingHandshake => write!(f, "AwaitingHandshake"),
            Self::Established => write!(f, "Established"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// One open connection plus what the reactor knows about it.
#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) conn: TcpConnection,
    pub(crate) identity: IdentityKey,
    state: ConnectionState,
    accepted_at: Instant,
}

impl Slot {
    /// Wraps a freshly accepted connection, already awaiting its
    /// handshake.
    pub(crate) fn new(conn: TcpConnection) -> Self {
        let identity = IdentityKey::from_peer(conn.peer_addr());
        let mut slot = Self {
            conn,
            identity,
            state: ConnectionState::Accepted,
            accepted_at: Instant::now(),
        };
        slot.transition(ConnectionState::AwaitingHandshake);
        slot
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn transition(&mut self, target: ConnectionState) {
        debug_assert!(
            self.state.can_transition_to(target),
            "invalid transition {} → {}",
            self.state,
            target
        );
        tracing::trace!(
            conn_id = %self.conn.id(),
            from = %self.state,
            to = %target,
            "connection state change"
        );
        self.state = target;
    }

    /// Returns `true` if this connection has waited longer than `limit`
    /// without registering.
    pub(crate) fn handshake_expired(&self, limit: Duration) -> bool {
        self.state == ConnectionState::AwaitingHandshake
            && self.accepted_at.elapsed() >= limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_next_follows_strict_order() {
        assert_eq!(
            ConnectionState::Accepted.next(),
            Some(ConnectionState::AwaitingHandshake)
        );
        assert_eq!(
            ConnectionState::AwaitingHandshake.next(),
            Some(ConnectionState::Established)
        );
        assert_eq!(
            ConnectionState::Established.next(),
            Some(ConnectionState::Closed)
        );
        assert_eq!(ConnectionState::Closed.next(), None);
    }

    #[test]
    fn test_connection_state_can_transition_to() {
        use ConnectionState::*;

        assert!(Accepted.can_transition_to(AwaitingHandshake));
        assert!(!Accepted.can_transition_to(Established));
        assert!(AwaitingHandshake.can_transition_to(Closed));
        assert!(Established.can_transition_to(Established));
        assert!(!Established.can_transition_to(AwaitingHandshake));
        assert!(!Closed.can_transition_to(Closed));
    }

    #[test]
    fn test_connection_state_is_open() {
        assert!(!ConnectionState::Accepted.is_open());
        assert!(ConnectionState::AwaitingHandshake.is_open());
        assert!(ConnectionState::Established.is_open());
        assert!(!ConnectionState::Closed.is_open());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(
            ConnectionState::AwaitingHandshake.to_string(),
            "AwaitingHandshake"
        );
        assert_eq!(ConnectionState::Closed.to_string(), "Closed");
    }
}
