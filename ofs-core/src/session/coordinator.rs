//! Request construction and response routing on top of [`Transport`].
//!
//! [`SessionHandler`] is the transport's message handler: it runs on the
//! receive task, keeps the session token and link state current, and
//! forwards every message to one `mpsc` sink. [`Coordinator`] is the
//! caller-facing half that builds requests and owns the transport.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::content::{self, CONTENT_FIELD};
use crate::error::OfsError;
use crate::message::{Incoming, Operation, Request, Response, make_request_id};
use crate::network::{ConnectionInfo, MessageHandler, Transport, TransportConfig};
use crate::session::event::{ClientEvent, Correlation};
use crate::session::state::{LinkState, PendingRequests, SessionState};

// ── SessionConfig ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub transport: TransportConfig,
    /// How long an unanswered request stays in the correlation table.
    pub pending_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            pending_ttl: Duration::from_secs(300),
        }
    }
}

// ── SessionHandler ───────────────────────────────────────────────

pub struct SessionHandler {
    token: RwLock<Option<String>>,
    pending: Mutex<PendingRequests>,
    link: watch::Sender<LinkState>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl SessionHandler {
    fn new(pending_ttl: Duration, events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        let (link, _) = watch::channel(LinkState::default());
        Self {
            token: RwLock::new(None),
            pending: Mutex::new(PendingRequests::new(pending_ttl)),
            link,
            events,
        }
    }

    fn emit(&self, event: ClientEvent) {
        // A dropped receiver just means nobody is watching.
        let _ = self.events.send(event);
    }

    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_token(&self, token: String) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    /// Drop the token. Returns `true` if one was held.
    fn clear_token(&self) -> bool {
        self.token
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, PendingRequests> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route one message from the transport.
    pub fn handle_incoming(&self, message: Incoming) {
        match message {
            Incoming::Closed => {
                self.link.send_replace(LinkState::PeerClosed);
                self.emit(ClientEvent::ConnectionClosed);
                if self.clear_token() {
                    info!("session ended: connection closed");
                    self.emit(ClientEvent::SessionEnded);
                }
            }
            Incoming::Error(reason) => {
                self.link.send_replace(LinkState::Failed(reason.clone()));
                self.emit(ClientEvent::TransportError(reason));
            }
            Incoming::Text(text) => self.emit(ClientEvent::Text(text)),
            Incoming::Json(value) => match Response::from_value(&value) {
                Some(response) => self.handle_response(response, value),
                None => self.emit(ClientEvent::Json(value)),
            },
        }
    }

    fn handle_response(&self, response: Response, raw: Value) {
        let correlation = response.request_id.as_deref().and_then(|id| {
            self.pending().resolve(id).map(|p| Correlation {
                request_id: id.to_string(),
                operation: p.operation,
                elapsed: p.sent_at.elapsed(),
            })
        });

        let mut derived = Vec::new();
        if response.is_success() {
            if response.is_operation(Operation::Login) {
                match response.data_str("session_id").filter(|t| !t.is_empty()) {
                    Some(token) => {
                        info!("session started");
                        self.set_token(token.to_string());
                        derived.push(ClientEvent::SessionStarted(token.to_string()));
                    }
                    None => debug!("login reply without a session token"),
                }
            } else if response.is_operation(Operation::FileRead) {
                if let Some(text) = response.data_str(CONTENT_FIELD) {
                    derived.push(match content::decode(text) {
                        Ok(bytes) => ClientEvent::FileContent(bytes),
                        Err(e) => {
                            warn!("file_read content: {e}");
                            ClientEvent::InvalidContent(e.to_string())
                        }
                    });
                }
            }
        }

        self.emit(ClientEvent::Response {
            response,
            raw,
            correlation,
        });
        for event in derived {
            self.emit(event);
        }
    }
}

impl MessageHandler for SessionHandler {
    fn handle(&self, message: Incoming) {
        self.handle_incoming(message);
    }
}

// ── Coordinator ──────────────────────────────────────────────────

pub struct Coordinator {
    handler: Arc<SessionHandler>,
    transport: Transport,
}

fn params<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

impl Coordinator {
    /// Create a coordinator whose events go to `events`.
    pub fn new(config: SessionConfig, events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        let handler = Arc::new(SessionHandler::new(config.pending_ttl, events));
        let transport = Transport::with_config(
            config.transport,
            Arc::clone(&handler) as Arc<dyn MessageHandler>,
        );
        Self { handler, transport }
    }

    /// Create a coordinator together with the receiving end of its events.
    pub fn channel(config: SessionConfig) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(config, tx), rx)
    }

    // ── Connection ────────────────────────────────────────────────

    pub async fn connect(&self, info: &ConnectionInfo) -> Result<(), OfsError> {
        if self.transport.is_connected().await {
            return Ok(());
        }
        self.handler.link.send_replace(LinkState::Connecting);
        if let Err(e) = self.transport.connect(info).await {
            self.handler.link.send_replace(LinkState::Disconnected);
            return Err(e);
        }
        // The peer may already have hung up; keep that state if so.
        let changed = self.handler.link.send_if_modified(|state| {
            if matches!(state, LinkState::Connecting) {
                *state = LinkState::Connected {
                    peer: info.clone(),
                    since: std::time::Instant::now(),
                };
                true
            } else {
                false
            }
        });
        if changed {
            self.handler.emit(ClientEvent::Connected(info.clone()));
        }
        Ok(())
    }

    /// Close the connection. The session token is kept.
    pub async fn disconnect(&self) {
        self.transport.close().await;
        self.handler.pending().clear();
        if !matches!(*self.handler.link.borrow(), LinkState::Disconnected) {
            self.handler.link.send_replace(LinkState::Disconnected);
            self.handler.emit(ClientEvent::Disconnected);
        }
    }

    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.handler.link.subscribe()
    }

    // ── Session ───────────────────────────────────────────────────

    pub fn session_id(&self) -> Option<String> {
        self.handler.token()
    }

    pub fn session_state(&self) -> SessionState {
        SessionState::from_token(self.handler.token())
    }

    /// Forget the session token locally, whatever the server thinks.
    pub fn logout(&self) {
        if self.handler.clear_token() {
            info!("session ended: logout");
            self.handler.emit(ClientEvent::SessionEnded);
        }
    }

    /// Feed a message through the same path the transport uses.
    pub fn handle_incoming(&self, message: Incoming) {
        self.handler.handle_incoming(message);
    }

    /// Number of sent requests not yet matched to a reply.
    pub fn pending_count(&self) -> usize {
        self.handler.pending().len()
    }

    // ── Requests ──────────────────────────────────────────────────

    /// Build, send and track a request. Returns its `request_id`.
    pub async fn issue_request(
        &self,
        operation: &str,
        parameters: Map<String, Value>,
        request_id: Option<String>,
    ) -> Result<String, OfsError> {
        let request = Request::new(operation, parameters, self.handler.token(), request_id);
        let line = request.to_line()?;
        self.send_tracked(line, request.request_id, operation).await
    }

    /// Send caller-written JSON, filling in `request_id` and `session_id`
    /// when missing.
    pub async fn send_raw(&self, text: &str) -> Result<String, OfsError> {
        let mut value: Value = serde_json::from_str(text.trim())
            .map_err(|e| OfsError::InvalidRequest(format!("not JSON: {e}")))?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| OfsError::InvalidRequest("not a JSON object".into()))?;
        let operation = object
            .get("cmd")
            .and_then(Value::as_str)
            .ok_or_else(|| OfsError::InvalidRequest("missing string field `cmd`".into()))?
            .to_string();

        let request_id = match object.get("request_id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let id = make_request_id("raw");
                object.insert("request_id".into(), Value::String(id.clone()));
                id
            }
        };
        if !object.contains_key("session_id") {
            if let Some(token) = self.handler.token() {
                object.insert("session_id".into(), Value::String(token));
            }
        }

        let line = serde_json::to_string(&value)?;
        self.send_tracked(line, request_id, &operation).await
    }

    async fn send_tracked(
        &self,
        line: String,
        request_id: String,
        operation: &str,
    ) -> Result<String, OfsError> {
        self.handler.pending().track(request_id.clone(), operation);
        match self.transport.send(&line).await {
            Ok(()) => {
                debug!(%request_id, "issued {operation}");
                Ok(request_id)
            }
            Err(e) => {
                self.handler.pending().resolve(&request_id);
                Err(e)
            }
        }
    }

    async fn issue(&self, op: Operation, parameters: Map<String, Value>) -> Result<String, OfsError> {
        self.issue_request(op.as_str(), parameters, None).await
    }

    // ── Typed operations ──────────────────────────────────────────

    pub async fn login(&self, username: &str, password: &str) -> Result<String, OfsError> {
        self.issue(
            Operation::Login,
            params([("username", json!(username)), ("password", json!(password))]),
        )
        .await
    }

    /// Send `logout` and drop the local token, even if the send fails.
    pub async fn logout_remote(&self) -> Result<String, OfsError> {
        let result = self.issue(Operation::Logout, Map::new()).await;
        self.logout();
        result
    }

    pub async fn whoami(&self) -> Result<String, OfsError> {
        self.issue(Operation::Whoami, Map::new()).await
    }

    pub async fn stats(&self) -> Result<String, OfsError> {
        self.issue(Operation::Stats, Map::new()).await
    }

    /// Ask the server process to exit.
    pub async fn shutdown_server(&self) -> Result<String, OfsError> {
        self.issue(Operation::Exit, Map::new()).await
    }

    pub async fn file_create(&self, path: &str, data: &[u8]) -> Result<String, OfsError> {
        self.issue(
            Operation::FileCreate,
            params([
                ("path", json!(path)),
                (CONTENT_FIELD, json!(content::encode(data))),
                ("size", json!(data.len())),
            ]),
        )
        .await
    }

    pub async fn file_read(&self, path: &str) -> Result<String, OfsError> {
        self.issue(Operation::FileRead, params([("path", json!(path))]))
            .await
    }

    pub async fn file_delete(&self, path: &str) -> Result<String, OfsError> {
        self.issue(Operation::FileDelete, params([("path", json!(path))]))
            .await
    }

    pub async fn file_rename(&self, old_path: &str, new_path: &str) -> Result<String, OfsError> {
        self.issue(
            Operation::FileRename,
            params([("old_path", json!(old_path)), ("new_path", json!(new_path))]),
        )
        .await
    }

    /// Overwrite part of a file starting at byte `index`.
    pub async fn file_edit(&self, path: &str, data: &[u8], index: u64) -> Result<String, OfsError> {
        self.issue(
            Operation::FileEdit,
            params([
                ("path", json!(path)),
                (CONTENT_FIELD, json!(content::encode(data))),
                ("size", json!(data.len())),
                ("index", json!(index)),
            ]),
        )
        .await
    }

    pub async fn file_truncate(&self, path: &str) -> Result<String, OfsError> {
        self.issue(Operation::FileTruncate, params([("path", json!(path))]))
            .await
    }

    pub async fn dir_create(&self, path: &str) -> Result<String, OfsError> {
        self.issue(Operation::DirCreate, params([("path", json!(path))]))
            .await
    }

    pub async fn dir_list(&self, path: &str) -> Result<String, OfsError> {
        self.issue(Operation::DirList, params([("path", json!(path))]))
            .await
    }

    pub async fn dir_delete(&self, path: &str) -> Result<String, OfsError> {
        self.issue(Operation::DirDelete, params([("path", json!(path))]))
            .await
    }

    pub async fn dir_exists(&self, path: &str) -> Result<String, OfsError> {
        self.issue(Operation::DirExists, params([("path", json!(path))]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> Vec<ClientEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn login_success(token: &str) -> Incoming {
        Incoming::Json(json!({
            "operation": "login",
            "status": "success",
            "data": {"session_id": token}
        }))
    }

    #[test]
    fn login_success_starts_session() {
        let (coord, mut rx) = Coordinator::channel(SessionConfig::default());
        assert_eq!(coord.session_state(), SessionState::NoSession);

        coord.handle_incoming(login_success("s-123"));
        assert_eq!(coord.session_state(), SessionState::HasSession("s-123".into()));

        let events = drain(&mut rx);
        assert!(matches!(events[0], ClientEvent::Response { .. }));
        assert_eq!(events[1], ClientEvent::SessionStarted("s-123".into()));
    }

    #[test]
    fn failed_or_malformed_login_keeps_state() {
        let (coord, _rx) = Coordinator::channel(SessionConfig::default());
        coord.handle_incoming(login_success("s-1"));

        coord.handle_incoming(Incoming::Json(json!({
            "operation": "login", "status": "error", "error_code": -2,
            "error_message": "Invalid credentials"
        })));
        coord.handle_incoming(Incoming::Json(json!({
            "operation": "login", "status": "success", "data": {"message": "logged_in"}
        })));
        coord.handle_incoming(Incoming::Json(json!({
            "operation": "login", "status": "success", "data": {"session_id": 42}
        })));
        coord.handle_incoming(Incoming::Json(json!({
            "operation": "login", "status": "success", "data": "oops"
        })));
        assert_eq!(coord.session_id().as_deref(), Some("s-1"));
    }

    #[test]
    fn login_token_captured_despite_odd_fields() {
        let replies = [
            json!({"operation": "login", "status": "success", "request_id": 7,
                   "data": {"session_id": "s-1"}}),
            json!({"operation": "login", "status": "success",
                   "error_message": {"detail": "x"}, "data": {"session_id": "s-2"}}),
            json!({"operation": "login", "status": "success", "error_code": null,
                   "request_id": null, "data": {"session_id": "s-3"}}),
        ];
        let (coord, mut rx) = Coordinator::channel(SessionConfig::default());
        for (reply, token) in replies.into_iter().zip(["s-1", "s-2", "s-3"]) {
            coord.handle_incoming(Incoming::Json(reply));
            assert_eq!(coord.session_state(), SessionState::HasSession(token.into()));
            let events = drain(&mut rx);
            assert!(matches!(events[0], ClientEvent::Response { .. }));
            assert_eq!(events[1], ClientEvent::SessionStarted(token.into()));
        }

        // A null operation is not a login reply.
        coord.handle_incoming(Incoming::Json(json!({
            "operation": null, "status": "success", "data": {"session_id": "s-4"}
        })));
        assert_eq!(coord.session_id().as_deref(), Some("s-3"));
        assert!(matches!(drain(&mut rx)[..], [ClientEvent::Response { .. }]));
    }

    #[test]
    fn logout_and_close_end_session() {
        let (coord, mut rx) = Coordinator::channel(SessionConfig::default());
        coord.handle_incoming(login_success("s-1"));
        coord.logout();
        assert_eq!(coord.session_state(), SessionState::NoSession);
        // A second logout is silent.
        coord.logout();

        coord.handle_incoming(login_success("s-2"));
        coord.handle_incoming(Incoming::Closed);
        assert_eq!(coord.session_state(), SessionState::NoSession);
        assert_eq!(*coord.link_state().borrow(), LinkState::PeerClosed);

        let ended = drain(&mut rx)
            .into_iter()
            .filter(|e| *e == ClientEvent::SessionEnded)
            .count();
        assert_eq!(ended, 2);
    }

    #[test]
    fn error_event_keeps_session() {
        let (coord, mut rx) = Coordinator::channel(SessionConfig::default());
        coord.handle_incoming(login_success("s-1"));
        drain(&mut rx);

        coord.handle_incoming(Incoming::Error("reset".into()));
        assert_eq!(coord.session_id().as_deref(), Some("s-1"));
        assert_eq!(drain(&mut rx), vec![ClientEvent::TransportError("reset".into())]);
        assert_eq!(*coord.link_state().borrow(), LinkState::Failed("reset".into()));
    }

    #[test]
    fn other_messages_pass_through() {
        let (coord, mut rx) = Coordinator::channel(SessionConfig::default());
        coord.handle_incoming(Incoming::Text("not valid json".into()));
        coord.handle_incoming(Incoming::Json(json!([1, 2, 3])));
        coord.handle_incoming(Incoming::Json(json!({"operation": "stats", "status": "success"})));

        let events = drain(&mut rx);
        assert_eq!(events[0], ClientEvent::Text("not valid json".into()));
        assert_eq!(events[1], ClientEvent::Json(json!([1, 2, 3])));
        match &events[2] {
            ClientEvent::Response { response, correlation, .. } => {
                assert_eq!(response.operation, "stats");
                assert!(correlation.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(events.len(), 3);
        assert_eq!(coord.session_state(), SessionState::NoSession);
    }

    #[test]
    fn file_read_content_is_decoded() {
        let (coord, mut rx) = Coordinator::channel(SessionConfig::default());
        coord.handle_incoming(Incoming::Json(json!({
            "operation": "file_read", "status": "success",
            "data": {"data_base64": content::encode(b"hello\x00world")}
        })));
        coord.handle_incoming(Incoming::Json(json!({
            "operation": "file_read", "status": "success",
            "data": {"data_base64": "@@not base64@@"}
        })));

        let events = drain(&mut rx);
        assert_eq!(events[1], ClientEvent::FileContent(b"hello\x00world".to_vec()));
        assert!(matches!(events[3], ClientEvent::InvalidContent(_)));
    }

    #[tokio::test]
    async fn requests_fail_without_connection() {
        let (coord, _rx) = Coordinator::channel(SessionConfig::default());
        assert!(matches!(coord.stats().await, Err(OfsError::NotConnected)));
        assert_eq!(coord.pending_count(), 0);
    }

    #[tokio::test]
    async fn logout_remote_clears_token_even_when_offline() {
        let (coord, _rx) = Coordinator::channel(SessionConfig::default());
        coord.handle_incoming(login_success("s-1"));
        assert!(coord.logout_remote().await.is_err());
        assert_eq!(coord.session_state(), SessionState::NoSession);
    }

    #[tokio::test]
    async fn send_raw_validates_input() {
        let (coord, _rx) = Coordinator::channel(SessionConfig::default());
        for bad in ["not json", "[1]", r#"{"request_id":"r1"}"#, r#"{"cmd":5}"#] {
            assert!(matches!(
                coord.send_raw(bad).await,
                Err(OfsError::InvalidRequest(_))
            ));
        }
        assert!(matches!(
            coord.send_raw(r#"{"cmd":"stats"}"#).await,
            Err(OfsError::NotConnected)
        ));
    }
}
