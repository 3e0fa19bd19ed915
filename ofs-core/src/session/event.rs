use std::time::Duration;

use serde_json::Value;

use crate::message::Response;
use crate::network::ConnectionInfo;

/// Links a reply to the request that echoed `request_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    pub request_id: String,
    pub operation: String,
    pub elapsed: Duration,
}

/// Everything the coordinator surfaces to its observer, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    // ── Connection ───────────────────────────────────────────────
    Connected(ConnectionInfo),
    /// Closed locally via `disconnect`.
    Disconnected,
    /// The server closed the connection.
    ConnectionClosed,
    /// The receive task stopped on an I/O error.
    TransportError(String),

    // ── Messages ─────────────────────────────────────────────────
    /// A JSON object from the server.
    Response {
        response: Response,
        raw: Value,
        correlation: Option<Correlation>,
    },
    /// Valid JSON that is not a response object.
    Json(Value),
    /// A line that was not JSON.
    Text(String),

    // ── Derived ──────────────────────────────────────────────────
    SessionStarted(String),
    SessionEnded,
    /// Decoded body of a successful `file_read`.
    FileContent(Vec<u8>),
    /// A `file_read` reply whose content could not be decoded.
    InvalidContent(String),
}
