//! `plaza-server`: run a Plaza server from the command line.
//!
//! ```text
//! plaza-server <BIND_ADDR> <PORT> [--capacity N] [--tick-ms MS] ...
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` to change the filter (default
//! `info`). Ctrl-C sends SHUTDOWN to every client and exits.

mod cli;
mod presenter;

use std::process::ExitCode;

use clap::Parser;
use plaza::prelude::*;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Args, ConfigError};

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Server(#[from] PlazaError),

    #[error("could not listen for Ctrl-C: {0}")]
    Signal(#[source] std::io::Error),
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "plaza-server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), AppError> {
    let config = args.server_config()?;
    let server = PlazaServer::builder()
        .bind(&args.socket_addr().to_string())
        .config(config)
        .build()
        .await?;
    let handle = server.start();

    let (present_stop, present_rx) = watch::channel(false);
    let presenter = tokio::spawn(presenter::run(
        handle.registry(),
        args.present_every(),
        present_rx,
    ));

    let signal = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");

    present_stop.send_replace(true);
    if let Err(e) = presenter.await {
        tracing::warn!(error = %e, "presenter task failed");
    }
    handle.shutdown().await?;
    signal.map_err(AppError::Signal)
}
