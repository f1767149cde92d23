//! Plain-text ping protocol handler.
//!
//! The payload is a UTF-8 command line. Dispatch is case-insensitive on the
//! command, first match wins:
//! - `PING` answers `PONG <server_timestamp_ms>`
//! - `PING-<correlation>` answers `PONG-<correlation>`, trailing data verbatim
//! - anything else answers `ACK-<original payload>`
//!
//! Non-UTF-8 payloads are malformed: dropped by the worker, connection stays
//! open.

use super::{MessageHandler, ProtocolError, RequestContext};

#[derive(Debug, Default)]
pub struct TextHandler;

impl TextHandler {
    pub fn new() -> Self {
        Self
    }
}

impl MessageHandler for TextHandler {
    fn handle(&self, payload: &[u8], _ctx: &RequestContext) -> Result<Vec<u8>, ProtocolError> {
        let command = std::str::from_utf8(payload)
            .map_err(|e| ProtocolError::Malformed(format!("invalid UTF-8: {}", e)))?
            .trim();

        let response = if command.eq_ignore_ascii_case("PING") {
            format!("PONG {}", chrono::Utc::now().timestamp_millis())
        } else if has_ping_prefix(command) {
            // The prefix is ASCII, so byte offset 5 is a char boundary
            format!("PONG-{}", &command[5..])
        } else {
            format!("ACK-{}", command)
        };

        Ok(response.into_bytes())
    }
}

/// Case-insensitive check for the `PING-` correlation prefix.
fn has_ping_prefix(command: &str) -> bool {
    command
        .as_bytes()
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(b"PING-"))
}
