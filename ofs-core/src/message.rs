//! Wire message types: outbound requests, inbound messages, and the
//! structured response view.
//!
//! Every message is one JSON object on one line. Requests carry the
//! envelope fields `cmd`, `request_id` and `session_id`; operation
//! parameters are merged into the same object.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::OfsError;

/// Status string the server uses for a successful operation.
pub const STATUS_SUCCESS: &str = "success";

/// Envelope keys a parameter map may not override.
pub const RESERVED_KEYS: [&str; 3] = ["cmd", "request_id", "session_id"];

// ── Operation ────────────────────────────────────────────────────

/// Operations understood by the OFS server.
///
/// Requests are not limited to these; [`Request::new`] accepts any
/// operation name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    // ── Session ──────────────────────────────────────────────────
    Login,
    Logout,
    Whoami,

    // ── System ───────────────────────────────────────────────────
    Stats,
    /// Ask the server process to exit.
    Exit,

    // ── File ─────────────────────────────────────────────────────
    FileCreate,
    FileRead,
    FileDelete,
    FileRename,
    FileEdit,
    FileTruncate,

    // ── Directory ────────────────────────────────────────────────
    DirCreate,
    DirList,
    DirDelete,
    DirExists,
}

impl Operation {
    pub const ALL: [Operation; 15] = [
        Operation::Login,
        Operation::Logout,
        Operation::Whoami,
        Operation::Stats,
        Operation::Exit,
        Operation::FileCreate,
        Operation::FileRead,
        Operation::FileDelete,
        Operation::FileRename,
        Operation::FileEdit,
        Operation::FileTruncate,
        Operation::DirCreate,
        Operation::DirList,
        Operation::DirDelete,
        Operation::DirExists,
    ];

    /// The `cmd` string sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Login => "login",
            Operation::Logout => "logout",
            Operation::Whoami => "whoami",
            Operation::Stats => "stats",
            Operation::Exit => "exit",
            Operation::FileCreate => "file_create",
            Operation::FileRead => "file_read",
            Operation::FileDelete => "file_delete",
            Operation::FileRename => "file_rename",
            Operation::FileEdit => "file_edit",
            Operation::FileTruncate => "file_truncate",
            Operation::DirCreate => "dir_create",
            Operation::DirList => "dir_list",
            Operation::DirDelete => "dir_delete",
            Operation::DirExists => "dir_exists",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = OfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| OfsError::InvalidRequest(format!("unknown operation: {s}")))
    }
}

// ── Request identifiers ──────────────────────────────────────────

/// Build a request identifier of the form `<prefix>_<unix-secs>_<hex6>`.
///
/// Uniqueness is best-effort: a coarse timestamp plus 24 random bits.
pub fn make_request_id(prefix: &str) -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{secs}_{}", &random[..6])
}

// ── Request ──────────────────────────────────────────────────────

/// An outbound request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    /// Operation name.
    pub cmd: String,

    /// Identifier echoed back by servers that support correlation.
    pub request_id: String,

    /// Active session token, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Operation parameters, merged into the top-level object.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl Request {
    /// Build a request, generating an identifier when none is supplied.
    ///
    /// Parameters named like an envelope field are discarded.
    pub fn new(
        cmd: impl Into<String>,
        mut params: Map<String, Value>,
        session_id: Option<String>,
        request_id: Option<String>,
    ) -> Self {
        let cmd = cmd.into();
        for key in RESERVED_KEYS {
            params.remove(key);
        }
        let request_id = match request_id {
            Some(id) if !id.is_empty() => id,
            _ => make_request_id(&cmd),
        };
        Self {
            cmd,
            request_id,
            session_id: session_id.filter(|s| !s.is_empty()),
            params,
        }
    }

    /// Serialize to a single JSON line (without the terminator).
    pub fn to_line(&self) -> Result<String, OfsError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Inbound ──────────────────────────────────────────────────────

/// A message produced by the transport's receive task.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// A line that parsed as JSON.
    Json(Value),
    /// A line that was not valid JSON, delivered verbatim.
    Text(String),
    /// The peer closed the connection (`connection_closed`).
    Closed,
    /// The receive task failed and stopped (`error`).
    Error(String),
}

impl Incoming {
    /// Parse one line of text, falling back to raw text.
    pub fn from_line(line: String) -> Self {
        match serde_json::from_str::<Value>(&line) {
            Ok(value) => Incoming::Json(value),
            Err(_) => Incoming::Text(line),
        }
    }
}

/// Structured view of a server response object.
///
/// Fields are read one by one: a field that is missing or has an
/// unexpected type reads as empty and does not affect the others.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub operation: String,
    pub status: String,
    pub data: Value,
    pub error_code: Option<Value>,
    pub error_message: Option<String>,
    pub request_id: Option<String>,
}

impl Response {
    /// View a JSON value as a response. Only objects qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_owned);
        Some(Self {
            operation: text("operation").unwrap_or_default(),
            status: text("status").unwrap_or_default(),
            data: object.get("data").cloned().unwrap_or(Value::Null),
            error_code: object.get("error_code").filter(|v| !v.is_null()).cloned(),
            error_message: text("error_message"),
            request_id: match object.get("request_id") {
                Some(Value::String(id)) => Some(id.clone()),
                Some(Value::Number(id)) => Some(id.to_string()),
                _ => None,
            },
        })
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    pub fn is_operation(&self, op: Operation) -> bool {
        self.operation == op.as_str()
    }

    /// A string field inside `data`, if present.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_roundtrip() {
        for op in Operation::ALL {
            assert_eq!(op.to_string().parse::<Operation>().unwrap(), op);
        }
        assert!("format_disk".parse::<Operation>().is_err());
    }

    #[test]
    fn request_id_shape() {
        let id = make_request_id("stats");
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "stats");
        assert!(parts[1].parse::<u64>().is_ok());
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(make_request_id("stats"), id);
    }

    #[test]
    fn request_flattens_params() {
        let mut params = Map::new();
        params.insert("username".into(), json!("a"));
        params.insert("password".into(), json!("b"));
        let req = Request::new("login", params, None, Some("login_1".into()));
        let value: Value = serde_json::from_str(&req.to_line().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"cmd": "login", "request_id": "login_1", "username": "a", "password": "b"})
        );
    }

    #[test]
    fn request_generates_id_and_attaches_session() {
        let req = Request::new("stats", Map::new(), Some("s-1".into()), None);
        assert!(req.request_id.starts_with("stats_"));
        let line = req.to_line().unwrap();
        assert!(line.contains(r#""session_id":"s-1""#));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn request_empty_ids_are_ignored() {
        let req = Request::new("whoami", Map::new(), Some(String::new()), Some(String::new()));
        assert!(req.session_id.is_none());
        assert!(req.request_id.starts_with("whoami_"));
    }

    #[test]
    fn reserved_params_do_not_override_envelope() {
        let mut params = Map::new();
        params.insert("cmd".into(), json!("exit"));
        params.insert("session_id".into(), json!("forged"));
        params.insert("path".into(), json!("/a"));
        let req = Request::new("file_read", params, None, Some("r1".into()));
        let value: Value = serde_json::from_str(&req.to_line().unwrap()).unwrap();
        assert_eq!(value["cmd"], "file_read");
        assert!(value.get("session_id").is_none());
        assert_eq!(value["path"], "/a");
    }

    #[test]
    fn embedded_newlines_are_escaped() {
        let mut params = Map::new();
        params.insert("path".into(), json!("a\nb"));
        let line = Request::new("dir_list", params, None, None).to_line().unwrap();
        assert!(!line.contains('\n'));
    }

    #[test]
    fn incoming_from_line() {
        assert_eq!(
            Incoming::from_line("not valid json".into()),
            Incoming::Text("not valid json".into())
        );
        assert_eq!(Incoming::from_line("[1,2]".into()), Incoming::Json(json!([1, 2])));
    }

    #[test]
    fn response_view() {
        let value = json!({
            "operation": "login",
            "status": "success",
            "request_id": "login_1",
            "data": {"session_id": "s-123", "message": "logged_in"}
        });
        let resp = Response::from_value(&value).unwrap();
        assert!(resp.is_success());
        assert!(resp.is_operation(Operation::Login));
        assert_eq!(resp.data_str("session_id"), Some("s-123"));
        assert_eq!(resp.request_id.as_deref(), Some("login_1"));

        let err = Response::from_value(&json!({
            "operation": "whoami", "status": "error", "error_code": -9, "error_message": "no session"
        }))
        .unwrap();
        assert!(!err.is_success());
        assert_eq!(err.error_code, Some(json!(-9)));

        assert!(Response::from_value(&json!("text")).is_none());
    }

    #[test]
    fn response_tolerates_wrong_field_types() {
        let resp = Response::from_value(&json!({
            "operation": null,
            "status": 1,
            "request_id": 7,
            "error_message": {"detail": "x"},
            "error_code": null
        }))
        .unwrap();
        assert_eq!(resp.operation, "");
        assert_eq!(resp.status, "");
        assert_eq!(resp.request_id.as_deref(), Some("7"));
        assert!(resp.error_message.is_none());
        assert!(resp.error_code.is_none());
        assert!(Response::from_value(&json!({})).is_some());
    }
}
