//! WebSocket URL parsing.

use crate::error::{FrameSockError, Result};

/// Parsed connection target for a `ws://` or `wss://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// Host name or IP address.
    pub host: String,
    /// Port number (default: 80 for ws, 443 for wss).
    pub port: u16,
    /// Request path including any query string (default: "/").
    pub path: String,
    /// Whether TLS is required (wss://).
    pub tls: bool,
}

impl ConnectionTarget {
    /// Parse a WebSocket URL.
    ///
    /// The scheme must be `ws` or `wss` (case-insensitive); anything else
    /// fails. The port defaults by scheme when absent. IPv6 hosts use the
    /// usual bracket form, e.g. `ws://[::1]:9001/feed`.
    pub fn parse(url: &str) -> Result<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| FrameSockError::InvalidUrl(format!("missing scheme: {url}")))?;

        let tls = if scheme.eq_ignore_ascii_case("ws") {
            false
        } else if scheme.eq_ignore_ascii_case("wss") {
            true
        } else {
            return Err(FrameSockError::InvalidUrl(format!(
                "unsupported scheme: {scheme}"
            )));
        };

        let default_port = if tls { 443 } else { 80 };

        let (host_port, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        if host_port.is_empty() {
            return Err(FrameSockError::InvalidUrl("missing host".into()));
        }

        let (host, port) = if let Some(bracket_end) = host_port.find(']') {
            // IPv6: [::1]:8080
            if !host_port.starts_with('[') {
                return Err(FrameSockError::InvalidUrl("malformed IPv6 host".into()));
            }
            let host = &host_port[1..bracket_end];
            let port = if host_port.len() > bracket_end + 1
                && host_port.as_bytes()[bracket_end + 1] == b':'
            {
                host_port[bracket_end + 2..]
                    .parse()
                    .map_err(|_| FrameSockError::InvalidUrl("invalid port".into()))?
            } else {
                default_port
            };
            (host.to_string(), port)
        } else if let Some((host, port)) = host_port.split_once(':') {
            let port = port
                .parse()
                .map_err(|_| FrameSockError::InvalidUrl("invalid port".into()))?;
            (host.to_string(), port)
        } else {
            (host_port.to_string(), default_port)
        };

        Ok(Self {
            host,
            port,
            path: path.to_string(),
            tls,
        })
    }
}
