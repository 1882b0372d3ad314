//! `PlazaServer` builder, startup and shutdown.
//!
//! This is the entry point for running a Plaza server. It ties together
//! all the layers: transport → protocol → registry, with the reactor
//! driving them from a single task.

use std::net::SocketAddr;
use std::sync::Arc;

use plaza_registry::PlayerRegistry;
use plaza_transport::TcpTransport;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::reactor::Reactor;
use crate::{PlazaError, ServerConfig};

/// Builder for configuring and binding a Plaza server.
///
/// # Example
///
/// ```rust,ignore
/// use plaza::prelude::*;
///
/// let server = PlazaServer::builder()
///     .bind("0.0.0.0:7777")
///     .config(ServerConfig::default())
///     .build()
///     .await?;
/// let handle = server.start();
/// // ...
/// handle.shutdown().await?;
/// ```
pub struct PlazaServerBuilder {
    bind_addr: String,
    config: ServerConfig,
}

impl PlazaServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:7777".to_string(),
            config: ServerConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the server configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener and creates an empty registry.
    ///
    /// The configuration is passed through
    /// [`ServerConfig::validated`] first.
    ///
    /// # Errors
    /// [`PlazaError::Transport`] if the address can't be bound. This is
    /// the only fatal error a server reports.
    pub async fn build(self) -> Result<PlazaServer, PlazaError> {
        let config = self.config.validated();
        let transport = TcpTransport::bind(&self.bind_addr).await?;
        let local_addr = transport.local_addr()?;
        let registry =
            Arc::new(PlayerRegistry::new(config.registry.clone()));

        Ok(PlazaServer {
            transport,
            local_addr,
            registry,
            config,
        })
    }
}

impl Default for PlazaServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound, not yet running, Plaza server.
///
/// Call [`start()`](Self::start) to spawn the reactor.
pub struct PlazaServer {
    transport: TcpTransport,
    local_addr: SocketAddr,
    registry: Arc<PlayerRegistry>,
    config: ServerConfig,
}

impl PlazaServer {
    /// Creates a new builder.
    pub fn builder() -> PlazaServerBuilder {
        PlazaServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared handle to the player registry.
    pub fn registry(&self) -> Arc<PlayerRegistry> {
        Arc::clone(&self.registry)
    }

    /// The validated configuration the server will run with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Spawns the reactor task and returns a handle to control it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> ServerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let reactor = Reactor::new(
            self.transport,
            Arc::clone(&self.registry),
            self.config,
            stop_rx,
        );
        tracing::info!(addr = %self.local_addr, "Plaza server running");
        let task = tokio::spawn(reactor.run());

        ServerHandle {
            local_addr: self.local_addr,
            registry: self.registry,
            stop_tx,
            task,
        }
    }
}

/// Control handle for a running server.
///
/// Dropping the handle also stops the server: the reactor treats a
/// vanished stop sender like a stop request. Use
/// [`shutdown()`](Self::shutdown) to wait for the broadcast to finish.
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: Arc<PlayerRegistry>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<Result<(), PlazaError>>,
}

impl ServerHandle {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared handle to the player registry.
    pub fn registry(&self) -> Arc<PlayerRegistry> {
        Arc::clone(&self.registry)
    }

    /// Asks the reactor to stop. Returns immediately.
    ///
    /// The reactor notices on its next wake-up (at most one tick later),
    /// sends SHUTDOWN to every open connection and exits.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Returns `true` once the reactor task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the reactor task to exit.
    ///
    /// # Errors
    /// [`PlazaError::TaskFailed`] if the task panicked or was aborted;
    /// otherwise whatever the reactor itself returned.
    pub async fn join(self) -> Result<(), PlazaError> {
        self.task.await?
    }

    /// Stops the reactor and waits until the shutdown broadcast is done.
    pub async fn shutdown(self) -> Result<(), PlazaError> {
        self.stop();
        self.join().await
    }
}
