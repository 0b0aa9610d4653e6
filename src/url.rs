//! Patch server address parsing (`host`, `host:port`, `tpf://host[:port]`)

use crate::protocol::DEFAULT_PORT;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddr {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

pub fn parse_server_addr(s: &str) -> Option<ServerAddr> {
    let s_trim = s.trim();
    let lower = s_trim.to_ascii_lowercase();
    let mut rest = if lower.starts_with("tpf://") {
        &s_trim["tpf://".len()..]
    } else if lower.contains("://") {
        return None;
    } else {
        s_trim
    };
    if let Some((hp, _path)) = rest.split_once('/') {
        rest = hp;
    }
    if rest.is_empty() {
        return None;
    }
    // Bracketed IPv6 literal
    if let Some(v6) = rest.strip_prefix('[') {
        let (host, tail) = v6.split_once(']')?;
        let port = match tail.strip_prefix(':') {
            Some(p) => p.parse().ok()?,
            None if tail.is_empty() => DEFAULT_PORT,
            None => return None,
        };
        return Some(ServerAddr {
            host: host.to_string(),
            port,
        });
    }
    let (host, port) = match rest.split_once(':') {
        Some((h, pr)) => (h.to_string(), pr.parse().ok()?),
        None => (rest.to_string(), DEFAULT_PORT),
    };
    if host.is_empty() {
        return None;
    }
    Some(ServerAddr { host, port })
}
