//! Per-connection worker.
//!
//! One worker owns one accepted connection end to end: socket tuning, the
//! receive/process/respond loop, adaptive pacing, statistics transitions,
//! and cleanup. Workers never touch each other's state; the statistics
//! registry is the only thing shared.
//!
//! Error policy:
//! - malformed payload: counted, message dropped, connection continues
//! - framing violation, idle timeout, write failure: counted, connection
//!   closed
//! - orderly EOF and cooperative shutdown: connection closed, not an error
//!
//! Nothing a worker hits ever propagates past it.

use crate::codec::{self, FrameError, MAX_MESSAGE_SIZE};
use crate::protocols::{MessageHandler, ProtocolError, RequestContext};
use crate::shutdown::Shutdown;
use crate::stats::StatsRegistry;
use socket2::SockRef;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

/// Message-count thresholds for the adaptive pacing governor
const PACE_LOW_MESSAGES: u64 = 10;
const PACE_MED_MESSAGES: u64 = 100;
const PACE_HIGH_MESSAGES: u64 = 1000;

/// A connection this old always gets the high-load pacing tier
const PACE_LONG_CONNECTION: Duration = Duration::from_secs(60);

/// Why the exchange loop ended
#[derive(Debug)]
enum CloseReason {
    /// Peer closed the stream at a frame boundary
    PeerClosed,
    /// Shutdown was requested; no message was in flight
    Shutdown,
    /// Connection was silent longer than the idle timeout
    IdleTimeout,
    /// Protocol violation on the wire
    Framing(FrameError),
    /// Response could not be written
    WriteFailed(FrameError),
}

impl CloseReason {
    /// Orderly closes are not counted as errors.
    fn is_orderly(&self) -> bool {
        matches!(self, CloseReason::PeerClosed | CloseReason::Shutdown)
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::Shutdown => write!(f, "shutdown requested"),
            CloseReason::IdleTimeout => write!(f, "idle timeout"),
            CloseReason::Framing(e) => write!(f, "framing: {}", e),
            CloseReason::WriteFailed(e) => write!(f, "write failed: {}", e),
        }
    }
}

/// Runs the full lifecycle of one accepted connection.
pub struct Worker {
    /// Server-assigned sequential connection id
    pub id: u64,
    pub peer: SocketAddr,
    pub handler: Arc<dyn MessageHandler>,
    pub stats: Arc<StatsRegistry>,
    pub shutdown: Shutdown,
    pub idle_timeout: Duration,
    pub pacing: bool,
}

impl Worker {
    /// Drive the connection until it closes. The connect has already been
    /// recorded by the acceptor (that is what assigned `id`); the matching
    /// disconnect is recorded here, on every exit path.
    pub async fn run(self, stream: TcpStream) {
        debug!(id = self.id, peer = %self.peer, "Connection accepted");

        // Tuning failures leave the connection usable, just untuned
        if let Err(e) = configure_socket(&stream) {
            debug!(id = self.id, error = %e, "Socket tuning failed");
        }

        let (messages, reason) = self.exchange_loop(stream).await;

        if reason.is_orderly() {
            debug!(id = self.id, peer = %self.peer, messages, reason = %reason, "Connection closed");
        } else {
            self.stats.record_error();
            warn!(id = self.id, peer = %self.peer, messages, reason = %reason, "Connection closed");
        }

        self.stats.record_disconnect();
    }

    /// Receive/process/respond until disconnect, error, or shutdown.
    /// Returns the number of messages received and why the loop ended.
    /// Dropping the stream on return is what closes the socket.
    async fn exchange_loop<S>(&self, mut stream: S) -> (u64, CloseReason)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let mut messages: u64 = 0;
        let mut shutdown = self.shutdown.clone();

        loop {
            // Shutdown is observed while waiting for the next request, never
            // mid-exchange: a response in flight is always fully written
            if shutdown.is_requested() {
                return (messages, CloseReason::Shutdown);
            }

            let recv = tokio::time::timeout(self.idle_timeout, codec::read_frame(&mut stream));
            let frame = tokio::select! {
                read = recv => match read {
                    Err(_) => return (messages, CloseReason::IdleTimeout),
                    Ok(Err(e)) => return (messages, CloseReason::Framing(e)),
                    Ok(Ok(None)) => return (messages, CloseReason::PeerClosed),
                    Ok(Ok(Some(frame))) => frame,
                },
                _ = shutdown.requested() => return (messages, CloseReason::Shutdown),
            };
            messages += 1;

            let ctx = RequestContext {
                message_id: messages,
            };
            let response = match self.handler.handle(&frame, &ctx) {
                Ok(response) => response,
                Err(e @ ProtocolError::Malformed(_)) => {
                    // Transient: drop the message, keep the connection
                    self.stats.record_error();
                    trace!(id = self.id, error = %e, "Dropped malformed message");
                    continue;
                }
                Err(e @ ProtocolError::Internal(_)) => {
                    // Server-side failure, not the client's fault; the
                    // message is still dropped and the connection kept
                    self.stats.record_error();
                    error!(id = self.id, error = %e, "Failed to build response");
                    continue;
                }
            };

            if let Err(e) = codec::write_frame(&mut stream, &response).await {
                return (messages, CloseReason::WriteFailed(e));
            }
            self.stats.record_message();

            if self.pacing {
                if let Some(pause) = pacing_delay(messages, started.elapsed()) {
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }
}

/// Apply per-connection socket tuning: flush small frames promptly and bound
/// the kernel buffers to the message size class. The idle timeout is enforced
/// with a timer around the read, not SO_RCVTIMEO, which nonblocking sockets
/// ignore.
fn configure_socket(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let sock = SockRef::from(stream);
    sock.set_recv_buffer_size(MAX_MESSAGE_SIZE)?;
    sock.set_send_buffer_size(MAX_MESSAGE_SIZE)?;
    Ok(())
}

/// Voluntary pause after a response, simulating per-message processing cost
/// that grows with sustained load. Busier/older connections pause less per
/// message so aggregate throughput degrades smoothly instead of collapsing.
/// Tunable freely; the protocol does not depend on it.
fn pacing_delay(messages: u64, elapsed: Duration) -> Option<Duration> {
    if messages > PACE_HIGH_MESSAGES || elapsed > PACE_LONG_CONNECTION {
        Some(Duration::from_micros(5))
    } else if messages > PACE_MED_MESSAGES {
        Some(Duration::from_micros(10))
    } else if messages > PACE_LOW_MESSAGES {
        Some(Duration::from_micros(20))
    } else {
        None
    }
}
