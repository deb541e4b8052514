//! db-router-core/src/address.rs
//! Parsed host:port pairs and the small enumerations that key off them.

use crate::error::RouterError;
use std::fmt;

/// Default port for the classic (length+seq framed) wire protocol.
pub const CLASSIC_DEFAULT_PORT: u16 = 3306;
/// Default port for the extended (length+type framed) wire protocol.
pub const EXTENDED_DEFAULT_PORT: u16 = 33060;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    Classic,
    Extended,
}

impl ProtocolKind {
    pub fn default_port(self) -> u16 {
        match self {
            ProtocolKind::Classic => CLASSIC_DEFAULT_PORT,
            ProtocolKind::Extended => EXTENDED_DEFAULT_PORT,
        }
    }

    pub fn parse(s: &str) -> Result<Self, RouterError> {
        match s {
            "classic" => Ok(ProtocolKind::Classic),
            "x" => Ok(ProtocolKind::Extended),
            other => Err(RouterError::InvalidAddress(
                other.to_string(),
                "protocol must be 'classic' or 'x'".to_string(),
            )),
        }
    }
}

/// Read-write/read-only filtering applied when a route has more than one
/// reachable role. `Undefined` is a parse-time sentinel only — it must
/// never be stored on a running `Route`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Undefined = 0,
    ReadWrite = 1,
    ReadOnly = 2,
}

impl AccessMode {
    pub fn parse(s: &str) -> Result<Self, RouterError> {
        match s {
            "read-write" => Ok(AccessMode::ReadWrite),
            "read-only" => Ok(AccessMode::ReadOnly),
            other => Err(RouterError::InvalidAccessMode(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AccessMode::Undefined => "",
            AccessMode::ReadWrite => "read-write",
            AccessMode::ReadOnly => "read-only",
        }
    }
}

/// A parsed `host[:port]` (or `[v6]:port`). `port == 0` means "not yet
/// defaulted"; callers must run it through `Address::with_default_port`
/// (or construct directly with a resolved protocol) before it is used to
/// dial or bind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    /// Parses `"host"`, `"host:port"`, or `"[v6]:port"`. Rejects an empty
    /// host, trailing junk after the port, a port outside `u16`, and a
    /// malformed dotted-quad (e.g. `"127.0.0.1.2"`).
    pub fn parse(s: &str) -> Result<Self, RouterError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RouterError::InvalidAddress(
                s.to_string(),
                "address is empty".to_string(),
            ));
        }

        let (host, port_str) = if let Some(rest) = s.strip_prefix('[') {
            let close = rest.find(']').ok_or_else(|| {
                RouterError::InvalidAddress(s.to_string(), "unterminated '['".to_string())
            })?;
            let host = &rest[..close];
            let after = &rest[close + 1..];
            if after.is_empty() {
                (host.to_string(), None)
            } else if let Some(p) = after.strip_prefix(':') {
                (host.to_string(), Some(p))
            } else {
                return Err(RouterError::InvalidAddress(
                    s.to_string(),
                    "trailing junk after ']'".to_string(),
                ));
            }
        } else {
            match s.rsplit_once(':') {
                // Bare IPv6 literal with no brackets and no port, e.g. "::1".
                Some((h, p)) if h.contains(':') => {
                    let _ = p;
                    (s.to_string(), None)
                }
                Some((h, p)) => (h.to_string(), Some(p)),
                None => (s.to_string(), None),
            }
        };

        if host.is_empty() {
            return Err(RouterError::InvalidAddress(
                s.to_string(),
                "host is empty".to_string(),
            ));
        }
        validate_host(s, &host)?;

        let port = match port_str {
            Some(p) => p.parse::<u32>().ok().filter(|v| *v <= u16::MAX as u32).ok_or_else(|| {
                RouterError::InvalidAddress(s.to_string(), format!("invalid port '{p}'"))
            })? as u16,
            None => 0,
        };

        Ok(Address { host, port })
    }

    /// Fills in `port == 0` with the protocol's default port. A no-op if a
    /// nonzero port was already present.
    pub fn with_default_port(mut self, protocol: ProtocolKind) -> Self {
        if self.port == 0 {
            self.port = protocol.default_port();
        }
        self
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Rejects hosts with the wrong number of dotted-quad octets, e.g.
/// `"127.0.0.1.2"`. Anything that isn't all-digits-and-dots is assumed to
/// be a DNS label and is accepted here; DNS resolution (or its absence) is
/// discovered later, at dial time.
fn validate_host(original: &str, host: &str) -> Result<(), RouterError> {
    let looks_numeric = host.chars().all(|c| c.is_ascii_digit() || c == '.');
    if looks_numeric && host.contains('.') {
        let octets: Vec<&str> = host.split('.').collect();
        if octets.len() != 4 || octets.iter().any(|o| o.is_empty() || o.parse::<u8>().is_err()) {
            return Err(RouterError::InvalidAddress(
                original.to_string(),
                "malformed IPv4 literal".to_string(),
            ));
        }
    }
    Ok(())
}
