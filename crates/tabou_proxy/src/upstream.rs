use std::fmt;

use tabou_config::ParentProxy;
use tabou_http::{ParseError, RequestLine};
use tokio::{
    net::TcpStream,
    time::{timeout, Duration},
};
use tracing::{debug, instrument};
use url::Host;

use crate::UpstreamConnectError;

/// Port used when the request URL does not name one.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Host and port the outbound connection goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    host: String,
    port: u16,
}

impl UpstreamTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// IPv6 literals are unbracketed.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// The parent proxy when one is configured, otherwise the request URL's
/// host and the port written in it (80 if none). A written port is used
/// even when it matches the scheme's default.
pub fn select_upstream(
    line: &RequestLine,
    parent: Option<&ParentProxy>,
) -> Result<UpstreamTarget, ParseError> {
    if let Some(parent) = parent {
        return Ok(UpstreamTarget::new(parent.host(), parent.port()));
    }

    let url = line.url();
    let host = match url.host() {
        Some(Host::Domain(d)) => d.to_string(),
        Some(Host::Ipv4(a)) => a.to_string(),
        Some(Host::Ipv6(a)) => a.to_string(),
        None => {
            return Err(ParseError::InvalidTarget {
                target: line.target_text().into_owned(),
                reason: "missing host".into(),
            });
        }
    };

    Ok(UpstreamTarget::new(host, line.port().unwrap_or(DEFAULT_HTTP_PORT)))
}

/// Opens the outbound connection. No retries.
#[instrument(skip_all, fields(upstream = %target))]
pub async fn connect(
    target: &UpstreamTarget,
    connect_timeout: Duration,
) -> Result<TcpStream, UpstreamConnectError> {
    let attempt = TcpStream::connect((target.host(), target.port()));

    let stream = match timeout(connect_timeout, attempt).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(UpstreamConnectError {
                target: target.to_string(),
                reason: e.to_string(),
            });
        }
        Err(_) => {
            return Err(UpstreamConnectError {
                target: target.to_string(),
                reason: format!("timed out after {}s", connect_timeout.as_secs()),
            });
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        debug!(target: "tabou::proxy", error = ?e, "Could not set TCP_NODELAY on upstream socket");
    }
    debug!(target: "tabou::proxy", "Upstream connected");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn line(target: &str) -> RequestLine {
        RequestLine::parse(format!("GET {target} HTTP/1.1").as_bytes()).unwrap()
    }

    #[test]
    fn direct_mode_uses_url_host_and_port_80() {
        let t = select_upstream(&line("http://example.test/foo"), None).unwrap();
        assert_eq!(t, UpstreamTarget::new("example.test", 80));
    }

    #[test]
    fn direct_mode_keeps_explicit_port() {
        let t = select_upstream(&line("http://example.test:8081/"), None).unwrap();
        assert_eq!(t.port(), 8081);

        let t = select_upstream(&line("http://[::1]:9000/"), None).unwrap();
        assert_eq!(t.host(), "::1");
        assert_eq!(t.to_string(), "[::1]:9000");
    }

    #[test]
    fn direct_mode_keeps_port_equal_to_scheme_default() {
        let t = select_upstream(&line("https://example.test:443/"), None).unwrap();
        assert_eq!(t, UpstreamTarget::new("example.test", 443));

        let t = select_upstream(&line("https://example.test/"), None).unwrap();
        assert_eq!(t.port(), DEFAULT_HTTP_PORT);
    }

    #[test]
    fn parent_mode_ignores_request_host() {
        let parent = ParentProxy::parse("http://parent.test:3128").unwrap();
        let t = select_upstream(&line("http://example.test:8081/foo"), Some(&parent)).unwrap();
        assert_eq!(t, UpstreamTarget::new("parent.test", 3128));
    }

    #[tokio::test]
    async fn connect_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let target = UpstreamTarget::new("127.0.0.1", port);
        connect(&target, Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn refused_connect_is_reported_with_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let target = UpstreamTarget::new("127.0.0.1", port);
        let err = connect(&target, Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.target, format!("127.0.0.1:{port}"));
        assert!(!err.reason.is_empty());
    }
}
