use std::fmt;

use crate::error::OfsError;

/// Host and port of the OFS server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a `host:port` string.
    pub fn parse(addr: &str) -> Result<Self, OfsError> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| OfsError::InvalidAddress(addr.to_string()))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| OfsError::InvalidAddress(addr.to_string()))?;
        let info = Self::new(host.trim_start_matches('[').trim_end_matches(']'), port);
        info.validate()?;
        Ok(info)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Reject addresses that can never be connected to.
    pub fn validate(&self) -> Result<(), OfsError> {
        if self.host.trim().is_empty() || self.port == 0 {
            return Err(OfsError::InvalidAddress(self.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let info = ConnectionInfo::parse("127.0.0.1:8080").unwrap();
        assert_eq!(info.host(), "127.0.0.1");
        assert_eq!(info.port(), 8080);
        assert_eq!(info.to_string(), "127.0.0.1:8080");

        let v6 = ConnectionInfo::parse("[::1]:9000").unwrap();
        assert_eq!(v6.host(), "::1");
        assert_eq!(v6.to_string(), "[::1]:9000");
    }

    #[test]
    fn rejects_bad_addresses() {
        assert!(ConnectionInfo::parse("localhost").is_err());
        assert!(ConnectionInfo::parse("localhost:http").is_err());
        assert!(ConnectionInfo::parse(":8080").is_err());
        assert!(ConnectionInfo::new("localhost", 0).validate().is_err());
    }
}
