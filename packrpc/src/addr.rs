//! Socket addresses in URI form.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::Error;

/// Where the RPC server listens.
///
/// Parsed from `tcp://host:port`, `unix:///path/to.sock`, `unix:relative.sock`
/// or a bare `host:port` (TCP).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
#[non_exhaustive]
pub enum Endpoint {
    /// Stream socket over TCP, as `host:port`.
    Tcp(String),
    /// Unix-domain stream socket at a filesystem path.
    Unix(PathBuf),
}

impl Endpoint {
    /// TCP endpoint for `host:port`.
    pub fn tcp(addr: impl Into<String>) -> Self {
        Self::Tcp(addr.into())
    }

    /// Unix-domain endpoint for `path`.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::Unix(path.into())
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::Tcp("localhost:8000".to_owned())
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix("tcp://") {
            return parse_host_port(rest).map(Self::Tcp);
        }
        if let Some(path) = s.strip_prefix("unix://").or_else(|| s.strip_prefix("unix:")) {
            if path.is_empty() {
                return Err(Error::Config(format!("empty unix socket path in '{s}'")));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if let Some((scheme, _)) = s.split_once("://") {
            return Err(Error::Config(format!("unsupported socket scheme '{scheme}'")));
        }
        parse_host_port(s).map(Self::Tcp)
    }
}

/// Accepts `host:port` with a non-empty host and a numeric port.
fn parse_host_port(s: &str) -> Result<String, Error> {
    let Some((host, port)) = s.rsplit_once(':') else {
        return Err(Error::Config(format!("expected host:port, got '{s}'")));
    };
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(Error::Config(format!("expected host:port, got '{s}'")));
    }
    Ok(s.to_owned())
}

impl TryFrom<String> for Endpoint {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_accepted_forms() {
        assert_eq!(
            "tcp://localhost:8000".parse::<Endpoint>().unwrap(),
            Endpoint::tcp("localhost:8000")
        );
        assert_eq!(
            "127.0.0.1:9".parse::<Endpoint>().unwrap(),
            Endpoint::tcp("127.0.0.1:9")
        );
        assert_eq!(
            "tcp://[::1]:8000".parse::<Endpoint>().unwrap(),
            Endpoint::tcp("[::1]:8000")
        );
        assert_eq!(
            "unix:///run/rpc.sock".parse::<Endpoint>().unwrap(),
            Endpoint::unix("/run/rpc.sock")
        );
        assert_eq!(
            "unix:rpc.sock".parse::<Endpoint>().unwrap(),
            Endpoint::unix("rpc.sock")
        );
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["udp://host:1", "localhost", "tcp://:80", "tcp://host:port", "unix://", ""] {
            let err = bad.parse::<Endpoint>().unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{bad}");
        }
    }

    #[test]
    fn display_roundtrips() {
        for s in ["tcp://localhost:8000", "unix:///tmp/x.sock"] {
            assert_eq!(s.parse::<Endpoint>().unwrap().to_string(), s);
        }
    }
}
