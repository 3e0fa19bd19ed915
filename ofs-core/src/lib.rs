//! # ofs-core
//!
//! Client library for the OFS filesystem server's line-delimited JSON
//! protocol.
//!
//! This crate contains:
//! - **Message types**: `Request`, `Response`, `Incoming`, `Operation`
//! - **Codec**: `JsonLineCodec` for newline-framed JSON via `tokio_util`
//! - **Network**: `Transport`, one TCP connection with a background receive task
//! - **Session**: `Coordinator`, session token tracking and response routing
//! - **Content**: base64 transform for file bodies
//! - **Error**: `OfsError`: typed, `thiserror`-based error hierarchy

pub mod codec;
pub mod content;
pub mod error;
pub mod message;
pub mod network;
pub mod session;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::JsonLineCodec;
pub use error::{ContentError, OfsError};
pub use message::{Incoming, Operation, Request, Response, make_request_id};
pub use network::{ConnectionInfo, MessageHandler, Transport, TransportConfig};
pub use session::{
    ClientEvent, Coordinator, Correlation, LinkState, SessionConfig, SessionState,
};
