use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::protocol::error::TarsError;

/// Transport named by an endpoint string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Udp,
    Ssl,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Udp => "udp",
            TransportKind::Ssl => "ssl",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Tars endpoint such as `tcp -h 127.0.0.1 -p 10000 -t 60000`.
///
/// Only the transport, `-h` and `-p` are interpreted; `-t` (idle timeout in
/// milliseconds) is kept when present and any other option is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub transport: TransportKind,
    pub host: String,
    pub port: u16,
    pub timeout_ms: Option<u64>,
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            transport: TransportKind::Tcp,
            host: host.into(),
            port,
            timeout_ms: None,
        }
    }

    pub fn is_tcp(&self) -> bool {
        self.transport == TransportKind::Tcp
    }

    /// `host:port`, suitable for binding or connecting.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = TarsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| TarsError::InvalidEndpoint(format!("'{}': {}", s, why));

        let mut parts = s.split_whitespace();
        let transport = match parts.next().map(str::to_ascii_lowercase).as_deref() {
            Some("tcp") => TransportKind::Tcp,
            Some("udp") => TransportKind::Udp,
            Some("ssl") => TransportKind::Ssl,
            Some(other) => return Err(invalid(&format!("unknown transport '{}'", other))),
            None => return Err(invalid("empty endpoint")),
        };

        let mut host = None;
        let mut port = None;
        let mut timeout_ms = None;
        while let Some(flag) = parts.next() {
            let value = parts.next();
            match (flag, value) {
                ("-h", Some(v)) => host = Some(v.to_string()),
                ("-p", Some(v)) => port = Some(v.parse::<u16>().map_err(|_| invalid("bad port"))?),
                ("-t", Some(v)) => timeout_ms = Some(v.parse::<u64>().map_err(|_| invalid("bad timeout"))?),
                (_, Some(_)) => {}
                (f, None) => return Err(invalid(&format!("option {} has no value", f))),
            }
        }

        Ok(Endpoint {
            transport,
            host: host.ok_or_else(|| invalid("missing -h"))?,
            port: port.ok_or_else(|| invalid("missing -p"))?,
            timeout_ms,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -h {} -p {}", self.transport, self.host, self.port)?;
        if let Some(t) = self.timeout_ms {
            write!(f, " -t {}", t)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_endpoint() {
        let ep: Endpoint = "tcp -h 127.0.0.1 -p 10000 -t 60000".parse().unwrap();
        assert!(ep.is_tcp());
        assert_eq!(ep.host, "127.0.0.1");
        assert_eq!(ep.port, 10000);
        assert_eq!(ep.timeout_ms, Some(60000));
        assert_eq!(ep.address(), "127.0.0.1:10000");
        assert_eq!(ep.to_string(), "tcp -h 127.0.0.1 -p 10000 -t 60000");
    }

    #[test]
    fn test_parse_ignores_unknown_options() {
        let ep: Endpoint = "UDP -h host -p 1 -e 0".parse().unwrap();
        assert_eq!(ep.transport, TransportKind::Udp);
        assert_eq!(ep.timeout_ms, None);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("".parse::<Endpoint>().is_err());
        assert!("http -h a -p 1".parse::<Endpoint>().is_err());
        assert!("tcp -h a".parse::<Endpoint>().is_err());
        assert!("tcp -h a -p 70000".parse::<Endpoint>().is_err());
        assert!("tcp -h a -p".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_ipv6_address() {
        assert_eq!(Endpoint::tcp("::1", 80).address(), "[::1]:80");
    }
}
