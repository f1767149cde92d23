//! Process-wide server statistics.
//!
//! A single registry instance is shared (via `Arc`) by the acceptor, every
//! connection worker, and the periodic reporter. All counters live behind one
//! mutex so a snapshot is always a consistent point-in-time view: an observer
//! can never see the active count incremented with the peak not yet
//! reconsidered.

use std::sync::Mutex;

/// Consistent point-in-time view of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Total connections accepted and handed to a worker
    pub total_connections: u64,
    /// Total messages processed (responses written)
    pub total_messages: u64,
    /// Workers currently running
    pub active_connections: u64,
    /// Highest concurrent worker count observed
    pub peak_connections: u64,
    /// Non-orderly failures: framing violations, timeouts, parse failures,
    /// write failures, accept errors
    pub errors: u64,
    /// Connections closed at the ceiling without entering a worker
    pub rejections: u64,
}

#[derive(Debug, Default)]
struct Counters {
    total_connections: u64,
    total_messages: u64,
    active_connections: u64,
    peak_connections: u64,
    errors: u64,
    rejections: u64,
}

/// Thread-safe statistics registry
#[derive(Debug, Default)]
pub struct StatsRegistry {
    counters: Mutex<Counters>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted connection. Increments the total and active
    /// counts and reconsiders the peak in the same critical section.
    /// Returns the connection's sequential identifier (1-based).
    pub fn record_connect(&self) -> u64 {
        let mut c = self.lock();
        c.total_connections += 1;
        c.active_connections += 1;
        if c.active_connections > c.peak_connections {
            c.peak_connections = c.active_connections;
        }
        c.total_connections
    }

    /// Register a worker exiting, orderly or not.
    pub fn record_disconnect(&self) {
        let mut c = self.lock();
        debug_assert!(c.active_connections > 0);
        c.active_connections = c.active_connections.saturating_sub(1);
    }

    /// Register one fully processed message (response written).
    pub fn record_message(&self) {
        self.lock().total_messages += 1;
    }

    /// Register a non-orderly failure.
    pub fn record_error(&self) {
        self.lock().errors += 1;
    }

    /// Register a connection rejected at the concurrency ceiling.
    pub fn record_rejection(&self) {
        self.lock().rejections += 1;
    }

    /// Current number of active workers (ceiling check).
    pub fn active_connections(&self) -> u64 {
        self.lock().active_connections
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = self.lock();
        StatsSnapshot {
            total_connections: c.total_connections,
            total_messages: c.total_messages,
            active_connections: c.active_connections,
            peak_connections: c.peak_connections,
            errors: c.errors,
            rejections: c.rejections,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        // Counter updates cannot panic while holding the lock, so a poisoned
        // mutex only happens if a panic hook runs between them; recover the
        // data rather than cascading the panic through every worker.
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }
}
