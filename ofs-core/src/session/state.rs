//! Session-side state: connection phase, session token phase, and the
//! best-effort table of requests awaiting a reply.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::network::ConnectionInfo;

// ── LinkState ────────────────────────────────────────────────────

/// Connection phase as seen by the coordinator.
///
/// ```text
///  Disconnected ──► Connecting ──► Connected ──► PeerClosed
///       ▲               │              │    └──► Failed
///       └───────────────┴──────────────┘   (local disconnect)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No connection. Initial state and the result of a local disconnect.
    #[default]
    Disconnected,

    /// A connect attempt is in flight.
    Connecting,

    /// The transport is up.
    Connected {
        peer: ConnectionInfo,
        since: Instant,
    },

    /// The server closed the connection.
    PeerClosed,

    /// The receive task stopped on an I/O error.
    Failed(String),
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { peer, .. } => write!(f, "Connected to {peer}"),
            Self::PeerClosed => write!(f, "Closed by server"),
            Self::Failed(reason) => write!(f, "Failed: {reason}"),
        }
    }
}

impl LinkState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// How long the link has been up. `None` unless connected.
    pub fn connected_duration(&self) -> Option<Duration> {
        match self {
            Self::Connected { since, .. } => Some(since.elapsed()),
            _ => None,
        }
    }
}

// ── SessionState ─────────────────────────────────────────────────

/// Whether the coordinator holds a session token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    NoSession,
    HasSession(String),
}

impl SessionState {
    pub fn from_token(token: Option<String>) -> Self {
        match token {
            Some(t) => Self::HasSession(t),
            None => Self::NoSession,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Self::HasSession(t) => Some(t),
            Self::NoSession => None,
        }
    }
}

// ── PendingRequests ──────────────────────────────────────────────

/// A request that was sent and may still get a reply.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub operation: String,
    pub sent_at: Instant,
}

/// Requests keyed by `request_id`, for annotating replies that echo it.
///
/// Nothing waits on this table. Entries nobody answers are dropped
/// once they are older than the TTL.
#[derive(Debug)]
pub struct PendingRequests {
    requests: HashMap<String, PendingRequest>,
    ttl: Duration,
}

impl PendingRequests {
    pub fn new(ttl: Duration) -> Self {
        Self {
            requests: HashMap::new(),
            ttl,
        }
    }

    pub fn track(&mut self, request_id: impl Into<String>, operation: impl Into<String>) {
        self.prune_expired();
        self.requests.insert(
            request_id.into(),
            PendingRequest {
                operation: operation.into(),
                sent_at: Instant::now(),
            },
        );
    }

    /// Remove and return the entry for `request_id`, if still tracked.
    pub fn resolve(&mut self, request_id: &str) -> Option<PendingRequest> {
        self.requests.remove(request_id)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Drop entries older than the TTL. Returns how many were removed.
    pub fn prune_expired(&mut self) -> usize {
        let before = self.requests.len();
        let ttl = self.ttl;
        self.requests.retain(|_, r| r.sent_at.elapsed() <= ttl);
        before - self.requests.len()
    }

    pub fn clear(&mut self) {
        self.requests.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_state_display() {
        assert_eq!(LinkState::Disconnected.to_string(), "Disconnected");
        let up = LinkState::Connected {
            peer: ConnectionInfo::new("127.0.0.1", 8080),
            since: Instant::now(),
        };
        assert_eq!(up.to_string(), "Connected to 127.0.0.1:8080");
        assert!(up.is_connected());
        assert!(up.connected_duration().is_some());
        assert!(LinkState::PeerClosed.connected_duration().is_none());
    }

    #[test]
    fn session_state_from_token() {
        assert_eq!(SessionState::from_token(None), SessionState::NoSession);
        let s = SessionState::from_token(Some("s-1".into()));
        assert_eq!(s.token(), Some("s-1"));
    }

    #[test]
    fn pending_track_and_resolve() {
        let mut pending = PendingRequests::new(Duration::from_secs(60));
        pending.track("stats_1", "stats");
        assert_eq!(pending.len(), 1);
        let entry = pending.resolve("stats_1").unwrap();
        assert_eq!(entry.operation, "stats");
        assert!(pending.resolve("stats_1").is_none());
        assert!(pending.is_empty());
    }

    #[test]
    fn pending_expires() {
        let mut pending = PendingRequests::new(Duration::ZERO);
        pending.track("a", "stats");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(pending.prune_expired(), 1);
        assert_eq!(pending.len(), 0);
    }
}
