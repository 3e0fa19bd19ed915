//! Domain-specific error types for the OFS client.
//!
//! Connect and send failures are returned synchronously to the caller.
//! Failures inside the background receive task never surface here; they
//! become lifecycle messages instead (see [`crate::message::Incoming`]).

use thiserror::Error;

/// The canonical error type for the OFS client.
#[derive(Debug, Error)]
pub enum OfsError {
    // ── Connection Errors ────────────────────────────────────────
    /// The TCP connection could not be established.
    #[error("cannot connect to {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Host and port did not resolve to a usable socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// An operation needed an open connection and there was none.
    #[error("not connected")]
    NotConnected,

    /// Writing to an established connection failed.
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    // ── Framing Errors ───────────────────────────────────────────
    /// A received line exceeded the configured limit.
    #[error("line too long (max {max} bytes)")]
    LineTooLong { max: usize },

    /// The socket reported an error while reading.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    // ── Request Errors ───────────────────────────────────────────
    /// A request could not be serialized.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Caller-supplied request text was not a usable request object.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// File content could not be transformed.
    #[error(transparent)]
    Content(#[from] ContentError),
}

impl OfsError {
    /// Returns `true` for errors raised while establishing a connection.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::InvalidAddress(_))
    }
}

// ── ContentError ──────────────────────────────────────────────────

/// Failure to turn transport-safe text back into bytes.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("invalid base64 content: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}
