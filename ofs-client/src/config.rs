//! Console client configuration.

use std::path::Path;
use std::time::Duration;

use ofs_core::{ConnectionInfo, SessionConfig, TransportConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the console client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Session bookkeeping.
    pub session: SessionSection,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Server host name or IP.
    pub host: String,
    /// Server TCP port.
    pub port: u16,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-request write timeout in milliseconds.
    pub write_timeout_ms: u64,
    /// Longest accepted response line, in bytes.
    pub max_line_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Seconds an unanswered request is kept for reply correlation.
    pub pending_ttl_secs: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            connect_timeout_ms: 5000,
            write_timeout_ms: 5000,
            max_line_length: ofs_core::codec::DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            pending_ttl_secs: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn server(&self) -> ConnectionInfo {
        ConnectionInfo::new(self.network.host.clone(), self.network.port)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            transport: TransportConfig {
                connect_timeout: Duration::from_millis(self.network.connect_timeout_ms),
                write_timeout: Duration::from_millis(self.network.write_timeout_ms),
                max_line_length: self.network.max_line_length,
            },
            pending_ttl: Duration::from_secs(self.session.pending_ttl_secs),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = ClientConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("host"));
        assert!(text.contains("pending_ttl_secs"));
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: ClientConfig = toml::from_str("[network]\nport = 9000\n").unwrap();
        assert_eq!(cfg.network.port, 9000);
        assert_eq!(cfg.network.host, "127.0.0.1");
        assert_eq!(cfg.session.pending_ttl_secs, 300);
        assert_eq!(cfg.server().to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn session_config_converts_units() {
        let cfg = ClientConfig::default();
        let session = cfg.session_config();
        assert_eq!(session.transport.connect_timeout, Duration::from_secs(5));
        assert_eq!(session.pending_ttl, Duration::from_secs(300));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = ClientConfig::load(Path::new("/nonexistent/ofs-client.toml"));
        assert_eq!(cfg.network.port, 8080);
    }
}
