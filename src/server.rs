//! TCP acceptor and worker supervision.
//!
//! Owns the single listening socket. For each incoming connection it either
//! rejects immediately (concurrency ceiling reached) or registers the
//! connection and spawns a worker task. On shutdown the acceptor stops
//! accepting, then waits a bounded grace period for workers to drain.

use crate::config::Config;
use crate::protocols::{self, MessageHandler};
use crate::shutdown::Shutdown;
use crate::stats::StatsRegistry;
use crate::worker::Worker;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// How long shutdown waits for in-flight connections before abandoning them
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Server instance
pub struct Server {
    config: Config,
    stats: Arc<StatsRegistry>,
    handler: Arc<dyn MessageHandler>,
    shutdown: Shutdown,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config, shutdown: Shutdown) -> Self {
        let stats = Arc::new(StatsRegistry::new());
        let handler = protocols::handler_for(config.protocol, Arc::clone(&stats));

        Server {
            config,
            stats,
            handler,
            shutdown,
        }
    }

    /// Shared statistics registry
    pub fn stats(&self) -> Arc<StatsRegistry> {
        Arc::clone(&self.stats)
    }

    /// Bind the listening socket and serve until shutdown. A bind/listen
    /// failure is the only error that propagates out; everything past
    /// startup is handled per connection.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.listen).await?;
        info!(
            address = %listener.local_addr()?,
            max_connections = self.config.max_connections,
            protocol = ?self.config.protocol,
            "Server listening"
        );
        self.serve(listener).await;
        Ok(())
    }

    /// Accept loop plus drain. Split from `run` so tests can bind to an
    /// ephemeral port themselves.
    async fn serve(&self, listener: TcpListener) {
        let reporter = if self.config.stats_interval > 0 {
            Some(tokio::spawn(report_task(
                Arc::clone(&self.stats),
                Duration::from_secs(self.config.stats_interval),
                self.shutdown.clone(),
            )))
        } else {
            None
        };

        let mut workers = JoinSet::new();
        let mut shutdown = self.shutdown.clone();

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.requested() => break,
            };

            match accepted {
                Ok((stream, peer)) => {
                    if self.stats.active_connections() >= self.config.max_connections as u64 {
                        // Reject without entering the worker lifecycle;
                        // dropping the stream closes it
                        self.stats.record_rejection();
                        warn!(peer = %peer, "Connection ceiling reached, rejecting");
                        continue;
                    }

                    let id = self.stats.record_connect();
                    let worker = Worker {
                        id,
                        peer,
                        handler: Arc::clone(&self.handler),
                        stats: Arc::clone(&self.stats),
                        shutdown: self.shutdown.clone(),
                        idle_timeout: Duration::from_secs(self.config.idle_timeout),
                        pacing: self.config.pacing,
                    };
                    workers.spawn(worker.run(stream));
                }
                Err(e) => {
                    if shutdown.is_requested() {
                        break;
                    }
                    self.stats.record_error();
                    error!(error = %e, "Failed to accept connection");
                }
            }

            // Reap finished workers so the set doesn't grow unbounded
            while workers.try_join_next().is_some() {}
        }

        // Stop accepting before draining; workers observe the flag between
        // exchanges and finish their in-flight response first
        drop(listener);

        if !workers.is_empty() {
            info!(active = workers.len(), "Draining workers");
        }
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = workers.len(),
                "Drain grace period elapsed, abandoning workers"
            );
            workers.shutdown().await;
        }

        if let Some(reporter) = reporter {
            reporter.abort();
        }

        let snap = self.stats.snapshot();
        info!(
            connections = snap.total_connections,
            messages = snap.total_messages,
            peak = snap.peak_connections,
            errors = snap.errors,
            rejections = snap.rejections,
            "Final stats"
        );
    }
}

/// Periodic observability task; reads snapshots only, never blocks workers.
async fn report_task(stats: Arc<StatsRegistry>, interval: Duration, mut shutdown: Shutdown) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snap = stats.snapshot();
                info!(
                    connections = snap.total_connections,
                    messages = snap.total_messages,
                    active = snap.active_connections,
                    peak = snap.peak_connections,
                    errors = snap.errors,
                    rejections = snap.rejections,
                    "Server stats"
                );
            }
            _ = shutdown.requested() => break,
        }
    }
}
