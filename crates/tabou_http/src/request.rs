use std::borrow::Cow;

use tokio::io::AsyncRead;
use tracing::{debug, instrument};
use url::Url;

use crate::{framing::LineReader, HttpError, ParseError};

/// `METHOD target VERSION`. The target is kept byte for byte and also
/// parsed as an absolute URL to find the host.
#[derive(Debug, Clone)]
pub struct RequestLine {
    method: String,
    target: Vec<u8>,
    url: Url,
    version: String,
}

impl RequestLine {
    pub fn parse(line: &[u8]) -> Result<Self, ParseError> {
        let malformed = || ParseError::MalformedRequestLine(String::from_utf8_lossy(line).into_owned());

        let mut parts = line.split(|&b| b == b' ');
        let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        if method.is_empty() || target.is_empty() || version.is_empty() {
            return Err(malformed());
        }
        let (Ok(method), Ok(version)) = (std::str::from_utf8(method), std::str::from_utf8(version))
        else {
            return Err(malformed());
        };

        let text = String::from_utf8_lossy(target);
        let invalid = |reason: String| ParseError::InvalidTarget {
            target: text.to_string(),
            reason,
        };
        let url = Url::parse(&text).map_err(|e| invalid(e.to_string()))?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host".into()));
        }

        Ok(Self {
            method: method.to_string(),
            target: target.to_vec(),
            url,
            version: version.to_string(),
        })
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// The target exactly as the client sent it.
    pub fn target(&self) -> &[u8] {
        &self.target
    }

    /// The target for logs and error messages.
    pub fn target_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.target)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Port written in the target's authority, even when it is the
    /// scheme's default (`https://h:443/`).
    pub fn port(&self) -> Option<u16> {
        self.url
            .port()
            .or_else(|| explicit_port(split_target(&self.target).0))
    }

    /// Origin-form target cut from the raw text: path plus `?query`, no
    /// scheme, host or fragment. Nothing is normalized or re-encoded.
    pub fn path_and_query(&self) -> Vec<u8> {
        let (_, rest) = split_target(&self.target);
        let rest = match rest.iter().position(|&b| b == b'#') {
            Some(i) => &rest[..i],
            None => rest,
        };

        let mut out = Vec::with_capacity(rest.len() + 1);
        if !rest.starts_with(b"/") {
            out.push(b'/');
        }
        out.extend_from_slice(rest);
        out
    }
}

/// Splits an absolute target into authority and everything after it.
/// Slashes after the scheme are skipped the way URL parsing does.
fn split_target(raw: &[u8]) -> (&[u8], &[u8]) {
    let after_scheme = match raw.iter().position(|&b| b == b':') {
        Some(i) => &raw[i + 1..],
        None => raw,
    };
    let start = after_scheme
        .iter()
        .position(|&b| b != b'/' && b != b'\\')
        .unwrap_or(after_scheme.len());
    let rest = &after_scheme[start..];
    let end = rest
        .iter()
        .position(|&b| matches!(b, b'/' | b'?' | b'#' | b'\\'))
        .unwrap_or(rest.len());
    rest.split_at(end)
}

fn explicit_port(authority: &[u8]) -> Option<u16> {
    let host_port = match authority.iter().rposition(|&b| b == b'@') {
        Some(i) => &authority[i + 1..],
        None => authority,
    };
    let port = if host_port.starts_with(b"[") {
        let close = host_port.iter().position(|&b| b == b']')?;
        host_port[close + 1..].strip_prefix(b":")?
    } else {
        let colon = host_port.iter().rposition(|&b| b == b':')?;
        &host_port[colon + 1..]
    };
    std::str::from_utf8(port).ok()?.parse().ok()
}

/// One `Name: value` header as raw bytes. The name is kept as received;
/// the value has surrounding whitespace trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLine {
    name: Vec<u8>,
    value: Vec<u8>,
}

impl HeaderLine {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Splits at the first `:`.
    pub fn parse(line: &[u8]) -> Result<Self, ParseError> {
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            return Err(ParseError::MalformedHeader(
                String::from_utf8_lossy(line).into_owned(),
            ));
        };
        Ok(Self::new(&line[..colon], line[colon + 1..].trim_ascii()))
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Case-insensitive name comparison.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.as_bytes())
    }
}

#[derive(Debug, Clone)]
pub struct IncomingRequest {
    line: RequestLine,
    headers: Vec<HeaderLine>,
}

impl IncomingRequest {
    pub fn new(line: RequestLine, headers: Vec<HeaderLine>) -> Self {
        Self { line, headers }
    }

    pub fn line(&self) -> &RequestLine {
        &self.line
    }

    /// Headers in the order received, duplicates included.
    pub fn headers(&self) -> &[HeaderLine] {
        &self.headers
    }
}

/// Reads the request line and header block.
///
/// Stops at the blank line (or end of stream); any body stays buffered in
/// `reader`. Returns `None` if the client closed before sending anything.
#[instrument(skip(reader))]
pub async fn read_request<R>(reader: &mut LineReader<R>) -> Result<Option<IncomingRequest>, HttpError>
where
    R: AsyncRead + Unpin,
{
    let Some(first) = reader.read_line().await? else {
        return Ok(None);
    };
    debug!(
        target: "tabou::http",
        request_line = %String::from_utf8_lossy(&first),
        "Read request line"
    );

    let line = RequestLine::parse(&first)?;

    let mut headers = Vec::new();
    while let Some(raw) = reader.read_line().await? {
        if raw.is_empty() {
            break;
        }
        debug!(target: "tabou::http", header = %String::from_utf8_lossy(&raw), "Read header line");
        headers.push(HeaderLine::parse(&raw)?);
    }

    Ok(Some(IncomingRequest::new(line, headers)))
}
