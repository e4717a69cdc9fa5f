//! # mediasync
//!
//! Relay server binary. Loads `.env` and settings, starts the HTTP/WebSocket
//! listener, and drains live sessions on Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mediasync_core::Broadcaster;
use mediasync_core::logging::{self, LogLevel};
use mediasync_server::{RelayServer, ServerConfig};
use mediasync_settings::RelaySettings;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

/// Room-based WebSocket relay for synchronized playback.
#[derive(Parser, Debug)]
#[command(name = "mediasync", about = "Room-based WebSocket relay server")]
struct Cli {
    /// Settings file (defaults to `$MEDIASYNC_CONFIG`, then `./mediasync.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Environment file loaded before settings (defaults to `.env`).
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log level: trace, debug, info, warn, error (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level = LogLevel::from_str_lossy(level);
        }
    }
}

/// Resolve settings from file, environment, and CLI.
fn resolve_settings(args: &Cli) -> Result<RelaySettings> {
    let path = mediasync_settings::settings_path(args.config.as_deref());
    let mut settings = mediasync_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    args.apply(&mut settings);
    Ok(settings)
}

/// Load an environment file into the process environment.
///
/// Variables already set in the process win. Returns `None` when the file
/// does not exist.
fn load_dotenv(path: Option<&Path>) -> Result<Option<PathBuf>, dotenvy::Error> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };
    match loaded {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Stop the listener, then wait for sessions to leave, all within `grace`.
///
/// Returns `true` if everything finished in time.
async fn shut_down(server: &RelayServer, handles: Vec<JoinHandle<()>>, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    let listener_done = server
        .shutdown()
        .graceful_shutdown(handles, Some(grace))
        .await;
    let drained = server
        .drain(deadline.saturating_duration_since(Instant::now()))
        .await;
    listener_done && drained
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // `.env` feeds the env overrides, and settings carry the log level, so
    // both load before the subscriber is up.
    let dotenv = load_dotenv(args.env_file.as_deref());
    let settings = resolve_settings(&args)?;
    logging::init_subscriber(settings.logging.level);
    match dotenv {
        Ok(Some(path)) => info!(path = %path.display(), "loaded environment file"),
        Ok(None) => warn!("no .env file found, using process environment"),
        Err(e) => warn!(error = %e, "failed to read .env file, using process environment"),
    }

    let metrics_handle =
        mediasync_server::metrics::install_recorder().context("Failed to install metrics recorder")?;

    let config = ServerConfig::from(&settings);
    let shutdown_timeout = config.shutdown_timeout;
    let server = RelayServer::new(config).with_metrics(metrics_handle);

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;
    info!("mediasync listening on ws://{addr}/ws");

    shutdown_signal().await?;

    info!("Shutting down...");
    if !shut_down(&server, vec![handle], shutdown_timeout).await {
        warn!(
            remaining = server.hub().stats().clients,
            "shutdown grace period elapsed with connections still open"
        );
    }

    info!("Shutdown complete");
    Ok(())
}
