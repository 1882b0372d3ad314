//! The connection multiplexer.
//!
//! A single task owns the listener and every open connection. Each loop
//! iteration builds one wait over:
//!
//! - the stop signal,
//! - the listener (new connections),
//! - every open connection (readiness, via [`TcpConnection::wait_readable`]),
//! - a periodic tick.
//!
//! Whichever fires first is handled, then the wait is rebuilt. When
//! several connections are readable at once they are all serviced in the
//! same pass, in acceptance order. Connections that fail or close during
//! a pass are only collected; they are closed and removed afterwards, so
//! removal never disturbs the pass that found them.
//!
//! The stop signal is also raced against every registration being read,
//! so a client that stalls mid-frame can't hold up shutdown, and no ACK
//! is written once a stop has been requested.
//!
//! [`TcpConnection::wait_readable`]: plaza_transport::TcpConnection::wait_readable

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::stream::{FuturesUnordered, StreamExt};
use plaza_protocol::{DecodeLimits, encode_shutdown, read_registration};
use plaza_registry::{PlayerRecord, PlayerRegistry};
use plaza_transport::{
    ConnectionId, Readiness, TcpConnection, TcpTransport, TransportError,
};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::connection::{ConnectionState, Slot};
use crate::handler::complete_registration;
use crate::{PlazaError, ServerConfig};

/// Upper bound on delivering the SHUTDOWN frame to one client.
const SHUTDOWN_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// What woke the reactor up.
enum Wake {
    Stop,
    Accepted(Result<TcpConnection, TransportError>),
    Ready(Vec<(ConnectionId, Readiness)>),
    Tick,
}

pub(crate) struct Reactor {
    transport: TcpTransport,
    registry: Arc<PlayerRegistry>,
    config: ServerConfig,
    stop: watch::Receiver<bool>,
    /// Open connections, keyed (and therefore ordered) by acceptance.
    slots: BTreeMap<ConnectionId, Slot>,
}

impl Reactor {
    pub(crate) fn new(
        transport: TcpTransport,
        registry: Arc<PlayerRegistry>,
        config: ServerConfig,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            transport,
            registry,
            config,
            stop,
            slots: BTreeMap::new(),
        }
    }

    /// Runs until the stop signal is raised (or its sender dropped), then
    /// sends SHUTDOWN to every open connection and closes them all.
    pub(crate) async fn run(mut self) -> Result<(), PlazaError> {
        let mut tick = time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            tick = ?self.config.tick_interval,
            max_connections = self.config.max_connections,
            "reactor running"
        );

        loop {
            let wake = {
                let mut readable: FuturesUnordered<_> = self
                    .slots
                    .values()
                    .map(|slot| async move {
                        (slot.conn.id(), slot.conn.wait_readable().await)
                    })
                    .collect();

                tokio::select! {
                    biased;

                    _ = stop_signalled(&mut self.stop) => Wake::Stop,
                    accepted = self.transport.accept() => Wake::Accepted(accepted),
                    Some(first) = readable.next() => {
                        let mut ready = vec![first];
                        while let Some(Some(more)) = readable.next().now_or_never() {
                            ready.push(more);
                        }
                        Wake::Ready(ready)
                    }
                    _ = tick.tick() => Wake::Tick,
                }
            };

            match wake {
                Wake::Stop => break,
                Wake::Accepted(Ok(conn)) => self.admit(conn).await,
                Wake::Accepted(Err(e)) => {
                    tracing::warn!(error = %e, "accept failed");
                }
                Wake::Ready(ready) => self.service_pass(ready).await,
                Wake::Tick => self.evict_idle().await,
            }
        }

        self.broadcast_shutdown().await;
        Ok(())
    }

    fn stop_requested(&self) -> bool {
        stop_requested(&self.stop)
    }

    /// Starts tracking a new connection, or turns it away if the server
    /// is at its connection limit.
    async fn admit(&mut self, conn: TcpConnection) {
        let conn_id = conn.id();
        let peer = conn.peer_addr();
        if self.slots.len() >= self.config.max_connections {
            tracing::warn!(
                %conn_id,
                %peer,
                max = self.config.max_connections,
                "connection limit reached, rejecting"
            );
            if let Err(e) = conn.close().await {
                tracing::debug!(%conn_id, error = %e, "close failed");
            }
            return;
        }

        let slot = Slot::new(conn);
        tracing::info!(
            %conn_id,
            %peer,
            identity = %slot.identity,
            open = self.slots.len() + 1,
            "connection accepted"
        );
        self.slots.insert(conn_id, slot);
    }

    /// Services every connection that reported readiness, then closes the
    /// ones that failed.
    async fn service_pass(&mut self, mut ready: Vec<(ConnectionId, Readiness)>) {
        ready.sort_by_key(|(id, _)| *id);
        tracing::trace!(count = ready.len(), "readiness pass");

        let mut closing = Vec::new();
        for (conn_id, readiness) in ready {
            if self.stop_requested() {
                tracing::debug!("stop requested mid-pass, skipping the rest");
                break;
            }
            let Some(slot) = self.slots.get_mut(&conn_id) else {
                continue;
            };

            match readiness {
                Readiness::Data => {
                    let serviced = service(
                        slot,
                        &self.registry,
                        &self.config,
                        &mut self.stop,
                    )
                    .await;
                    match serviced {
                        Ok(None) => {
                            tracing::debug!(
                                %conn_id,
                                "stop requested mid-registration, dropping it"
                            );
                            break;
                        }
                        Ok(Some(record)) => {
                            slot.transition(ConnectionState::Established);
                            tracing::debug!(
                                %conn_id,
                                player_id = %record.player_id,
                                "ACK sent"
                            );
                        }
                        Err(e) => {
                            if e.is_peer_closed() {
                                tracing::debug!(%conn_id, "peer closed mid-message");
                            } else {
                                tracing::debug!(
                                    %conn_id,
                                    error = %e,
                                    "registration failed"
                                );
                            }
                            closing.push(conn_id);
                        }
                    }
                }
                Readiness::Closed => {
                    tracing::debug!(%conn_id, "peer closed");
                    closing.push(conn_id);
                }
                Readiness::Failed(e) => {
                    tracing::debug!(%conn_id, error = %e, "socket error");
                    closing.push(conn_id);
                }
            }
        }

        for conn_id in closing {
            self.close(conn_id).await;
        }
    }

    /// Closes connections that never registered within the handshake
    /// timeout, if one is configured.
    async fn evict_idle(&mut self) {
        let Some(limit) = self.config.handshake_timeout else {
            return;
        };
        let expired: Vec<ConnectionId> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.handshake_expired(limit))
            .map(|(id, _)| *id)
            .collect();

        for conn_id in expired {
            tracing::debug!(
                %conn_id,
                error = %PlazaError::HandshakeTimeout(limit),
                "evicting idle connection"
            );
            self.close(conn_id).await;
        }
    }

    /// Removes a connection from the open set and closes its socket.
    ///
    /// The player is marked disconnected unless another registered
    /// connection from the same identity is still open.
    async fn close(&mut self, conn_id: ConnectionId) {
        let Some(mut slot) = self.slots.remove(&conn_id) else {
            return;
        };
        slot.transition(ConnectionState::Closed);

        let identity = slot.identity;
        let shared = self.slots.values().any(|other| {
            other.identity == identity
                && other.state() == ConnectionState::Established
        });
        if !shared {
            self.registry.mark_disconnected(identity);
        }

        if let Err(e) = slot.conn.close().await {
            tracing::debug!(%conn_id, error = %e, "close failed");
        }
        tracing::info!(
            %conn_id,
            %identity,
            open = self.slots.len(),
            "connection closed"
        );
    }

    /// Sends one SHUTDOWN frame to every open connection and closes it.
    async fn broadcast_shutdown(&mut self) {
        let frame = encode_shutdown();
        let slots = std::mem::take(&mut self.slots);
        tracing::info!(open = slots.len(), "reactor shutting down");

        for (conn_id, mut slot) in slots {
            match time::timeout(SHUTDOWN_SEND_TIMEOUT, slot.conn.send(&frame))
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(%conn_id, error = %e, "shutdown frame not delivered");
                }
                Err(_) => {
                    tracing::debug!(%conn_id, "shutdown frame timed out");
                }
            }
            slot.transition(ConnectionState::Closed);
            self.registry.mark_disconnected(slot.identity);
            if let Err(e) = slot.conn.close().await {
                tracing::debug!(%conn_id, error = %e, "close failed");
            }
        }
        tracing::info!("reactor stopped");
    }
}

/// Returns `true` once a stop was requested or the handle went away.
fn stop_requested(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow() || stop.has_changed().is_err()
}

/// Resolves once [`stop_requested`] would return `true`.
async fn stop_signalled(stop: &mut watch::Receiver<bool>) {
    // An error means the sender is gone, which counts as a stop.
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// Runs one registration for a readable connection, bounded by the
/// configured read timeout.
///
/// Returns `Ok(None)` if a stop was requested before the ACK could be
/// sent. Nothing is written or committed in that case.
async fn service(
    slot: &mut Slot,
    registry: &PlayerRegistry,
    config: &ServerConfig,
    stop: &mut watch::Receiver<bool>,
) -> Result<Option<PlayerRecord>, PlazaError> {
    let registration =
        register_unless_stopped(slot, registry, &config.limits, stop);
    match config.read_timeout {
        Some(limit) => time::timeout(limit, registration)
            .await
            .map_err(|_| PlazaError::ReadTimeout)?,
        None => registration.await,
    }
}

async fn register_unless_stopped(
    slot: &mut Slot,
    registry: &PlayerRegistry,
    limits: &DecodeLimits,
    stop: &mut watch::Receiver<bool>,
) -> Result<Option<PlayerRecord>, PlazaError> {
    let identity = slot.identity;
    let stream = slot.conn.stream_mut();

    let registration = tokio::select! {
        biased;

        _ = stop_signalled(stop) => return Ok(None),
        decoded = read_registration(&mut *stream, limits) => decoded?,
    };
    if stop_requested(stop) {
        return Ok(None);
    }

    complete_registration(stream, identity, registry, &registration)
        .await
        .map(Some)
}
