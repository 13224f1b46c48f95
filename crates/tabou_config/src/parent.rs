use std::{fmt, str::FromStr};

use url::{Host, Url};

use crate::ConfigError;

/// Fixed upstream proxy every request is relayed through.
///
/// Accepts a full URL (`http://parent:3128/`) or a bare `host:port`,
/// which is read as `http://host:port`. Without an explicit port the
/// scheme's default is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentProxy {
    url: Url,
    host: String,
    port: u16,
}

impl ParentProxy {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidParentProxy {
            url: raw.to_string(),
            reason,
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty value".into()));
        }

        let url = if trimmed.contains("://") {
            Url::parse(trimmed)
        } else {
            Url::parse(&format!("http://{trimmed}"))
        }
        .map_err(|e| invalid(e.to_string()))?;

        let host = match url.host() {
            Some(Host::Domain(d)) => d.to_string(),
            Some(Host::Ipv4(a)) => a.to_string(),
            Some(Host::Ipv6(a)) => a.to_string(),
            None => return Err(invalid("missing host".into())),
        };
        let port = url.port_or_known_default().unwrap_or(80);

        Ok(Self { url, host, port })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Host to connect to; IPv6 literals are unbracketed.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for ParentProxy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ParentProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
