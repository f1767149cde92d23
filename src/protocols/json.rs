//! Structured JSON protocol handler.
//!
//! Requests are JSON objects: `{"type": "...", "data": "...",
//! "timestamp": <ms>}`, every field optional with defaults. Dispatch is
//! case-insensitive on `type`:
//! - `PING` answers with data `PONG`
//! - `ECHO` answers with the request's `data` unchanged
//! - `STATS` answers with data `SERVER_STATS` (the numeric snapshot rides in
//!   the always-present `server_stats` object)
//! - anything else answers with data `ACK`
//!
//! Every response carries the server wall-clock timestamp in milliseconds,
//! the echoed client timestamp (0 when absent), the per-connection message
//! id, and a live snapshot of the active-connection and total-message counts.

use super::{MessageHandler, ProtocolError, RequestContext};
use crate::stats::StatsRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    data: String,
    #[serde(default)]
    timestamp: i64,
}

#[derive(Debug, Serialize)]
struct Response {
    #[serde(rename = "type")]
    kind: &'static str,
    data: String,
    server_timestamp: i64,
    client_timestamp: i64,
    message_id: u64,
    server_stats: EmbeddedStats,
}

#[derive(Debug, Serialize)]
struct EmbeddedStats {
    active_connections: u64,
    total_messages: u64,
}

pub struct JsonHandler {
    stats: Arc<StatsRegistry>,
}

impl JsonHandler {
    pub fn new(stats: Arc<StatsRegistry>) -> Self {
        Self { stats }
    }
}

impl MessageHandler for JsonHandler {
    fn handle(&self, payload: &[u8], ctx: &RequestContext) -> Result<Vec<u8>, ProtocolError> {
        let request: Request = serde_json::from_slice(payload)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let data = match request.kind.to_ascii_uppercase().as_str() {
            "PING" => "PONG".to_string(),
            "ECHO" => request.data,
            "STATS" => "SERVER_STATS".to_string(),
            _ => "ACK".to_string(),
        };

        let snapshot = self.stats.snapshot();
        let response = Response {
            kind: "RESPONSE",
            data,
            server_timestamp: chrono::Utc::now().timestamp_millis(),
            client_timestamp: request.timestamp,
            message_id: ctx.message_id,
            server_stats: EmbeddedStats {
                active_connections: snapshot.active_connections,
                total_messages: snapshot.total_messages,
            },
        };

        serde_json::to_vec(&response).map_err(|e| ProtocolError::Internal(e.to_string()))
    }
}
