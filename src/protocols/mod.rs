//! Protocol handlers.
//!
//! A handler interprets one decoded message payload and produces one response
//! payload. The connection machinery (framing, timeouts, pacing, statistics
//! transitions) is identical across variants; only the handler differs:
//!
//! - `text`: plain-text ping/pong commands
//! - `json`: structured JSON request/response with embedded server stats
//!
//! Handlers never touch the socket. A malformed payload is reported as
//! [`ProtocolError::Malformed`]; the worker counts it and drops the message,
//! keeping the connection open.

mod json;
mod text;

pub use json::JsonHandler;
pub use text::TextHandler;

use crate::config::ProtocolVariant;
use crate::stats::StatsRegistry;
use std::sync::Arc;

/// Per-message context supplied by the connection worker.
pub struct RequestContext {
    /// Sequence number of this message on its connection (1-based)
    pub message_id: u64,
}

/// Handler-level failures. All variants are transient: the message is
/// dropped and the connection continues. The distinction is who is at
/// fault — `Malformed` is a client problem, `Internal` a server one — so
/// the worker can log them at the right severity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload did not decode as the expected shape
    Malformed(String),
    /// The handler failed to build a response
    Internal(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Malformed(reason) => write!(f, "malformed message: {}", reason),
            ProtocolError::Internal(reason) => write!(f, "response failed: {}", reason),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// A pluggable message protocol.
pub trait MessageHandler: Send + Sync {
    /// Build the response for one request payload.
    fn handle(&self, payload: &[u8], ctx: &RequestContext) -> Result<Vec<u8>, ProtocolError>;
}

/// Construct the handler for the configured protocol variant.
pub fn handler_for(
    variant: ProtocolVariant,
    stats: Arc<StatsRegistry>,
) -> Arc<dyn MessageHandler> {
    match variant {
        ProtocolVariant::Json => Arc::new(JsonHandler::new(stats)),
        ProtocolVariant::Text => Arc::new(TextHandler::new()),
    }
}
