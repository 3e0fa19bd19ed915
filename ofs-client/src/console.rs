//! Line-oriented console: command parsing, execution, and event rendering.

use std::path::PathBuf;

use ofs_core::{ClientEvent, ConnectionInfo, Coordinator, LinkState, OfsError, SessionState};
use serde_json::Value;

pub const HELP: &str = "\
commands:
  connect [host:port]            open the connection
  disconnect                     close the connection
  login <user> <password>        start a session
  logout                         end the session
  whoami | stats | exit-server
  create <path> <local-file>     upload a new file
  read <path>                    download a file
  delete <path>
  rename <old> <new>
  edit <path> <local-file> [index]
  truncate <path>
  mkdir | ls | rmdir | exists <path>
  raw <json>                     send a request object as-is
  session                        show connection and session state
  help | quit";

// ── Parsing ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Connect(Option<String>),
    Disconnect,
    Login { username: String, password: String },
    Logout,
    Whoami,
    Stats,
    ExitServer,
    Create { path: String, local: PathBuf },
    Read(String),
    Delete(String),
    Rename { old: String, new: String },
    Edit { path: String, local: PathBuf, index: u64 },
    Truncate(String),
    Mkdir(String),
    List(String),
    Rmdir(String),
    Exists(String),
    Raw(String),
    Session,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        let Some(word) = line.split_whitespace().next() else {
            return Ok(None);
        };
        let args: Vec<&str> = line.split_whitespace().skip(1).collect();
        let one = |name: &str| -> Result<String, String> {
            match args.as_slice() {
                [a] => Ok(a.to_string()),
                _ => Err(format!("usage: {name} <path>")),
            }
        };

        let cmd = match word {
            "connect" => match args.as_slice() {
                [] => Self::Connect(None),
                [addr] => Self::Connect(Some(addr.to_string())),
                _ => return Err("usage: connect [host:port]".into()),
            },
            "disconnect" => Self::Disconnect,
            "login" => match args.as_slice() {
                [u, p] => Self::Login {
                    username: u.to_string(),
                    password: p.to_string(),
                },
                _ => return Err("usage: login <user> <password>".into()),
            },
            "logout" => Self::Logout,
            "whoami" => Self::Whoami,
            "stats" => Self::Stats,
            "exit-server" => Self::ExitServer,
            "create" => match args.as_slice() {
                [path, local] => Self::Create {
                    path: path.to_string(),
                    local: PathBuf::from(local),
                },
                _ => return Err("usage: create <path> <local-file>".into()),
            },
            "read" => Self::Read(one("read")?),
            "delete" => Self::Delete(one("delete")?),
            "rename" => match args.as_slice() {
                [old, new] => Self::Rename {
                    old: old.to_string(),
                    new: new.to_string(),
                },
                _ => return Err("usage: rename <old> <new>".into()),
            },
            "edit" => match args.as_slice() {
                [path, local] | [path, local, _] => {
                    let index = match args.get(2) {
                        Some(i) => i.parse().map_err(|_| format!("invalid index: {i}"))?,
                        None => 0,
                    };
                    Self::Edit {
                        path: path.to_string(),
                        local: PathBuf::from(local),
                        index,
                    }
                }
                _ => return Err("usage: edit <path> <local-file> [index]".into()),
            },
            "truncate" => Self::Truncate(one("truncate")?),
            "mkdir" => Self::Mkdir(one("mkdir")?),
            "ls" => Self::List(args.first().unwrap_or(&"/").to_string()),
            "rmdir" => Self::Rmdir(one("rmdir")?),
            "exists" => Self::Exists(one("exists")?),
            "raw" => {
                let body = line["raw".len()..].trim();
                if body.is_empty() {
                    return Err("usage: raw <json>".into());
                }
                Self::Raw(body.to_string())
            }
            "session" => Self::Session,
            "help" | "?" => Self::Help,
            "quit" | "q" => Self::Quit,
            other => return Err(format!("unknown command: {other} (try `help`)")),
        };
        Ok(Some(cmd))
    }
}

// ── Execution ────────────────────────────────────────────────────

/// Whether the console keeps reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

async fn read_local(path: &PathBuf) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| format!("cannot read {}: {e}", path.display()).into())
}

/// Run one command. Returns what to print, if anything.
pub async fn execute(
    cmd: ConsoleCommand,
    coord: &Coordinator,
    default_server: &ConnectionInfo,
) -> Result<(Flow, Option<String>), Box<dyn std::error::Error>> {
    let sent = |op: &str, id: String| Some(format!("SENT {op} ({id})"));

    let out = match cmd {
        ConsoleCommand::Connect(addr) => {
            let info = match addr {
                Some(a) => ConnectionInfo::parse(&a)?,
                None => default_server.clone(),
            };
            coord.connect(&info).await?;
            None
        }
        ConsoleCommand::Disconnect => {
            coord.disconnect().await;
            None
        }
        ConsoleCommand::Login { username, password } => {
            sent("login", coord.login(&username, &password).await?)
        }
        ConsoleCommand::Logout => sent("logout", coord.logout_remote().await?),
        ConsoleCommand::Whoami => sent("whoami", coord.whoami().await?),
        ConsoleCommand::Stats => sent("stats", coord.stats().await?),
        ConsoleCommand::ExitServer => sent("exit", coord.shutdown_server().await?),
        ConsoleCommand::Create { path, local } => {
            let data = read_local(&local).await?;
            sent("file_create", coord.file_create(&path, &data).await?)
        }
        ConsoleCommand::Read(path) => sent("file_read", coord.file_read(&path).await?),
        ConsoleCommand::Delete(path) => sent("file_delete", coord.file_delete(&path).await?),
        ConsoleCommand::Rename { old, new } => {
            sent("file_rename", coord.file_rename(&old, &new).await?)
        }
        ConsoleCommand::Edit { path, local, index } => {
            let data = read_local(&local).await?;
            sent("file_edit", coord.file_edit(&path, &data, index).await?)
        }
        ConsoleCommand::Truncate(path) => {
            sent("file_truncate", coord.file_truncate(&path).await?)
        }
        ConsoleCommand::Mkdir(path) => sent("dir_create", coord.dir_create(&path).await?),
        ConsoleCommand::List(path) => sent("dir_list", coord.dir_list(&path).await?),
        ConsoleCommand::Rmdir(path) => sent("dir_delete", coord.dir_delete(&path).await?),
        ConsoleCommand::Exists(path) => sent("dir_exists", coord.dir_exists(&path).await?),
        ConsoleCommand::Raw(text) => sent("raw", coord.send_raw(&text).await?),
        ConsoleCommand::Session => {
            let link = coord.link_state().borrow().clone();
            Some(describe_session(
                &link,
                &coord.session_state(),
                coord.pending_count(),
            ))
        }
        ConsoleCommand::Help => Some(HELP.to_string()),
        ConsoleCommand::Quit => return Ok((Flow::Quit, None)),
    };
    Ok((Flow::Continue, out))
}

/// One-line summary printed by the `session` command.
pub fn describe_session(link: &LinkState, session: &SessionState, pending: usize) -> String {
    let link = match link.connected_duration() {
        Some(up) => format!("{link} (up {}s)", up.as_secs()),
        None => link.to_string(),
    };
    let session = match session.token() {
        Some(token) => format!("session {token}"),
        None => "no session".to_string(),
    };
    format!("{link}; {session}; {pending} pending")
}

/// Human-readable explanation of a failed command.
pub fn describe_error(err: &(dyn std::error::Error + 'static)) -> String {
    match err.downcast_ref::<OfsError>() {
        Some(OfsError::NotConnected) => "not connected (use `connect`)".to_string(),
        Some(e) if e.is_connection_error() => format!("connection error: {e}"),
        Some(e @ OfsError::Send(_)) => format!("send error: {e}"),
        Some(e) => e.to_string(),
        None => err.to_string(),
    }
}

// ── Rendering ────────────────────────────────────────────────────

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Text for one event, without the timestamp.
pub fn render(event: &ClientEvent) -> String {
    match event {
        ClientEvent::Connected(info) => format!("Connected to {info}"),
        ClientEvent::Disconnected => "Disconnected".to_string(),
        ClientEvent::ConnectionClosed => "[notice] server closed connection".to_string(),
        ClientEvent::TransportError(e) => format!("[socket error] {e}"),
        ClientEvent::Response {
            response,
            raw,
            correlation,
        } => {
            let mut out = String::new();
            if let Some(code) = &response.error_code {
                out.push_str(&format!(
                    "[ERROR_CODE] {code} - {}\n",
                    response.error_message.as_deref().unwrap_or_default()
                ));
            }
            if let Some(c) = correlation {
                out.push_str(&format!(
                    "reply to {} ({}) after {} ms\n",
                    c.operation,
                    c.request_id,
                    c.elapsed.as_millis()
                ));
            }
            out.push_str(&pretty(raw));
            out
        }
        ClientEvent::Json(value) => pretty(value),
        ClientEvent::Text(text) => text.clone(),
        ClientEvent::SessionStarted(token) => format!("Logged in (session: {token})"),
        ClientEvent::SessionEnded => "Logged out".to_string(),
        ClientEvent::FileContent(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => format!("file_read ({} bytes):\n{text}", bytes.len()),
            Err(_) => format!("file_read: received binary ({} bytes)", bytes.len()),
        },
        ClientEvent::InvalidContent(e) => format!("file_read: cannot decode content: {e}"),
    }
}

/// Prefix every line with a local `HH:MM:SS` timestamp.
pub fn timestamped(text: &str) -> String {
    let t = chrono::Local::now().format("%H:%M:%S");
    text.lines()
        .map(|line| format!("[{t}] {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
