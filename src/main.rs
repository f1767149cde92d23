//! scalebench: a concurrent TCP server for scalability benchmarking
//!
//! Accepts many simultaneous client connections and exchanges
//! length-prefixed request/response messages over each one:
//! - JSON protocol: PING/ECHO/STATS requests with stats-bearing responses
//! - Text protocol: plain ping/pong command lines
//!
//! Features:
//! - One worker task per connection with a configurable concurrency ceiling
//! - Adaptive per-message pacing to emulate load-dependent processing cost
//! - Live statistics (connections, messages, peak concurrency, errors)
//! - Graceful shutdown with a bounded drain on SIGINT/SIGTERM
//! - Configuration via CLI arguments or TOML file

mod codec;
mod config;
mod protocols;
mod server;
mod shutdown;
mod stats;
mod worker;

use config::Config;
use server::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        protocol = ?config.protocol,
        max_connections = config.max_connections,
        idle_timeout = config.idle_timeout,
        pacing = config.pacing,
        "Starting scalebench server"
    );

    let (handle, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown requested");
        handle.trigger();
    });

    let server = Server::new(config, shutdown);
    server.run().await
}

/// Resolve when the process is asked to stop (Ctrl-C, or SIGTERM on unix).
/// If a signal handler cannot be installed the future pends forever rather
/// than triggering a spurious shutdown.
async fn wait_for_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let sigterm = async {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm => {}
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
