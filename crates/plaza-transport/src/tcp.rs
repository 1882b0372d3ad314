//! TCP transport implementation on top of `tokio::net`.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::{ConnectionId, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A TCP listener that produces [`TcpConnection`]s.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Binds a new listener to the given address.
    ///
    /// # Errors
    /// Returns [`TransportError::Bind`] if the socket cannot be created or
    /// bound. This is the only transport failure the server treats as fatal.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener =
            TcpListener::bind(addr).await.map_err(|source| {
                TransportError::Bind {
                    addr: addr.to_string(),
                    source,
                }
            })?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self { listener })
    }

    /// Returns the address the listener is actually bound to.
    ///
    /// Useful when binding to port 0 and letting the OS pick.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for and accepts the next incoming connection.
    pub async fn accept(&self) -> Result<TcpConnection, TransportError> {
        let (stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        // Frames are tiny; don't let Nagle hold back an ACK.
        stream
            .set_nodelay(true)
            .map_err(TransportError::AcceptFailed)?;

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::debug!(%id, %peer_addr, "accepted TCP connection");

        Ok(TcpConnection {
            id,
            peer_addr,
            stream,
        })
    }
}

/// Result of waiting for a connection to become readable.
#[derive(Debug)]
pub enum Readiness {
    /// At least one byte is buffered and can be read without blocking.
    Data,
    /// The peer closed its side; the next read returns zero bytes.
    Closed,
    /// The socket reported an error while waiting.
    Failed(TransportError),
}

/// A single accepted TCP connection.
#[derive(Debug)]
pub struct TcpConnection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    stream: TcpStream,
}

impl TcpConnection {
    /// Returns the unique identifier for this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the remote address this connection was accepted from.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Waits until the connection has data or the peer closed it.
    ///
    /// Peeks a single byte, so nothing is consumed: the framing codec
    /// still sees the full message afterwards. Only needs `&self`, which
    /// lets one task wait on many connections at once.
    pub async fn wait_readable(&self) -> Readiness {
        let mut probe = [0u8; 1];
        match self.stream.peek(&mut probe).await {
            Ok(0) => Readiness::Closed,
            Ok(_) => Readiness::Data,
            Err(e) => Readiness::Failed(TransportError::ReceiveFailed(e)),
        }
    }

    /// Mutable access to the underlying stream for message decoding.
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Writes the whole buffer to the peer and flushes it.
    ///
    /// Partial writes are retried by `write_all` until every byte is out.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.stream
            .write_all(data)
            .await
            .map_err(TransportError::SendFailed)?;
        self.stream.flush().await.map_err(TransportError::SendFailed)
    }

    /// Shuts down the write side and drops the socket.
    pub async fn close(mut self) -> Result<(), TransportError> {
        let result = self
            .stream
            .shutdown()
            .await
            .map_err(TransportError::SendFailed);
        tracing::debug!(id = %self.id, "connection closed");
        result
    }
}
