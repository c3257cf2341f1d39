use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, TransportError};

/// Where the board's byte stream can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket path (serial bridge or simulator).
    Unix(PathBuf),
    /// TCP `host:port` (serial-to-network bridge).
    Tcp(String),
}

impl Endpoint {
    /// Parse a target string.
    ///
    /// Accepted forms: `unix:<path>`, `tcp:<host>:<port>`, or a bare path which
    /// is treated as a Unix domain socket.
    pub fn parse(target: &str) -> Result<Self> {
        let target = target.trim();
        if target.is_empty() {
            return Err(invalid(target, "empty target"));
        }

        if let Some(path) = target.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(invalid(target, "missing socket path"));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }

        if let Some(addr) = target.strip_prefix("tcp:") {
            let Some((host, port)) = addr.rsplit_once(':') else {
                return Err(invalid(target, "expected tcp:<host>:<port>"));
            };
            if host.is_empty() || port.parse::<u16>().is_err() {
                return Err(invalid(target, "expected tcp:<host>:<port>"));
            }
            return Ok(Self::Tcp(addr.to_string()));
        }

        if target.contains("://") {
            return Err(invalid(target, "unknown scheme"));
        }

        Ok(Self::Unix(PathBuf::from(target)))
    }

    /// Short transport name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unix(_) => "unix",
            Self::Tcp(_) => "tcp",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

fn invalid(target: &str, reason: &'static str) -> TransportError {
    TransportError::InvalidTarget {
        target: target.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explicit_unix() {
        let ep = Endpoint::parse("unix:/tmp/board.sock").unwrap();
        assert_eq!(ep, Endpoint::Unix(PathBuf::from("/tmp/board.sock")));
        assert_eq!(ep.kind(), "unix");
    }

    #[test]
    fn bare_path_is_unix() {
        let ep = Endpoint::parse("/tmp/board.sock").unwrap();
        assert_eq!(ep, Endpoint::Unix(PathBuf::from("/tmp/board.sock")));
    }

    #[test]
    fn parses_tcp() {
        let ep = Endpoint::parse("tcp:192.168.1.20:4001").unwrap();
        assert_eq!(ep, Endpoint::Tcp("192.168.1.20:4001".to_string()));
        assert_eq!(ep.to_string(), "tcp:192.168.1.20:4001");
    }

    #[test]
    fn rejects_bad_targets() {
        for target in ["", "unix:", "tcp:nohost", "tcp::4001", "tcp:host:port", "ws://x"] {
            let err = Endpoint::parse(target).unwrap_err();
            assert!(
                matches!(err, TransportError::InvalidTarget { .. }),
                "{target:?} should be rejected"
            );
        }
    }
}
