//! Bind addresses of the form `tcp://host:port`.

use std::fmt;
use std::str::FromStr;

const TCP_SCHEME: &str = "tcp://";

/// A parsed `tcp://host:port` bind address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` as accepted by `TcpStream::connect`.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{TCP_SCHEME}{}", self.socket_addr())
    }
}

/// Why a bind address could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid endpoint '{input}': {reason}")]
pub struct EndpointError {
    pub input: String,
    pub reason: &'static str,
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let fail = |reason| EndpointError {
            input: input.to_string(),
            reason,
        };

        let rest = input
            .strip_prefix(TCP_SCHEME)
            .ok_or_else(|| fail("expected tcp:// scheme"))?;
        let (host, port) = rest.rsplit_once(':').ok_or_else(|| fail("missing port"))?;

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(fail("missing host"));
        }

        let port = port.parse::<u16>().map_err(|_| fail("invalid port"))?;
        Ok(Self::new(host, port))
    }
}
