//! Command-line arguments and how they map onto [`ServerConfig`].

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use plaza::ServerConfig;

/// Errors loading the optional config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Avatar registration server.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// IP address to listen on
    pub bind_addr: IpAddr,

    /// TCP port to listen on
    pub port: u16,

    /// JSON file with a full or partial server configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum number of distinct players
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Maximum number of simultaneously open connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Reactor wake-up interval in milliseconds
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Close connections that haven't registered after this many seconds
    #[arg(long)]
    pub handshake_timeout_secs: Option<u64>,

    /// How often the presenter refreshes, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub present_every_ms: u64,
}

impl Args {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub fn present_every(&self) -> Duration {
        Duration::from_millis(self.present_every_ms.max(1))
    }

    /// Builds the server config: file (or defaults), then flags on top.
    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ServerConfig::default(),
        };
        if let Some(capacity) = self.capacity {
            config.registry.capacity = capacity;
        }
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }
        if let Some(ms) = self.tick_ms {
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = self.handshake_timeout_secs {
            config.handshake_timeout = Some(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| {
        ConfigError::Read {
            path: path.to_owned(),
            source,
        }
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}
