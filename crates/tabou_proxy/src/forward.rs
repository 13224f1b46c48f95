use std::io;

use tabou_http::{HeaderLine, IncomingRequest, LineReader, ParseError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};

/// Hop-by-hop headers never forwarded upstream, upper-cased.
pub const FILTERED_HEADERS: [&str; 3] = ["KEEP-ALIVE", "PROXY-CONNECTION", "CONNECTION"];

/// How the outbound request line names its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    /// Origin server: path and query only.
    Direct,
    /// Parent proxy: the absolute URL as received.
    Parent,
}

pub fn is_filtered(name: &[u8]) -> bool {
    FILTERED_HEADERS
        .iter()
        .any(|filtered| name.eq_ignore_ascii_case(filtered.as_bytes()))
}

/// Request head rewritten for the upstream plus the body length to copy.
///
/// Built before connecting so a bad `Content-Length` is still reported to
/// the client.
#[derive(Debug)]
pub struct OutboundRequest {
    head: Vec<u8>,
    body_len: u64,
}

impl OutboundRequest {
    pub fn prepare(request: &IncomingRequest, mode: ForwardMode) -> Result<Self, ParseError> {
        let line = request.line();
        let mut head = Vec::with_capacity(256);
        head.extend_from_slice(line.method().as_bytes());
        head.push(b' ');
        match mode {
            ForwardMode::Parent => head.extend_from_slice(line.target()),
            ForwardMode::Direct => head.extend_from_slice(&line.path_and_query()),
        }
        head.push(b' ');
        head.extend_from_slice(line.version().as_bytes());
        head.extend_from_slice(b"\r\n");

        let mut body_len = 0u64;

        for header in request.headers() {
            if is_filtered(header.name()) {
                continue;
            }
            if header.is("content-length") {
                body_len = parse_content_length(header)?;
            }
            head.extend_from_slice(header.name());
            head.extend_from_slice(b": ");
            head.extend_from_slice(header.value());
            head.extend_from_slice(b"\r\n");
        }

        head.extend_from_slice(b"Connection: close\r\n\r\n");

        Ok(Self { head, body_len })
    }

    pub fn body_len(&self) -> u64 {
        self.body_len
    }

    /// Writes the head, then copies `body_len` bytes from the client.
    /// Returns the number of body bytes actually forwarded.
    #[instrument(skip_all, fields(body_len = self.body_len))]
    pub async fn send<R, W>(&self, client: &mut LineReader<R>, upstream: &mut W) -> io::Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + ?Sized,
    {
        upstream.write_all(&self.head).await?;

        let copied = client.copy_exact(self.body_len, upstream).await?;
        if copied < self.body_len {
            debug!(
                target: "tabou::proxy",
                expected = self.body_len,
                copied,
                "Client closed before sending the full body"
            );
        }

        upstream.flush().await?;
        Ok(copied)
    }
}

fn parse_content_length(header: &HeaderLine) -> Result<u64, ParseError> {
    std::str::from_utf8(header.value())
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| {
            ParseError::InvalidContentLength(String::from_utf8_lossy(header.value()).into_owned())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabou_http::{read_request, LineReader};
    use tokio::time::Duration;

    async fn request(bytes: &[u8]) -> (IncomingRequest, LineReader<&[u8]>) {
        let mut reader = LineReader::new(bytes, Duration::from_secs(5));
        let req = read_request(&mut reader).await.unwrap().unwrap();
        (req, reader)
    }

    async fn forward(bytes: &[u8], mode: ForwardMode) -> Vec<u8> {
        let (req, mut reader) = request(bytes).await;
        let out = OutboundRequest::prepare(&req, mode).unwrap();
        let mut upstream = Vec::new();
        out.send(&mut reader, &mut upstream).await.unwrap();
        upstream
    }

    #[test]
    fn filter_is_case_insensitive() {
        for name in ["Keep-Alive", "KEEP-ALIVE", "keep-alive", "Proxy-Connection", "connection"] {
            assert!(is_filtered(name.as_bytes()), "{name}");
        }
        assert!(!is_filtered(b"Content-Type"));
        assert!(!is_filtered(b"Connection-Id"));
        assert!(!is_filtered(b" Connection"));
    }

    #[tokio::test]
    async fn direct_mode_sends_origin_form_and_closes() {
        let out = forward(
            b"GET http://example.test/foo HTTP/1.1\r\nHost: example.test\r\nContent-Length: 0\r\n\r\n",
            ForwardMode::Direct,
        )
        .await;
        assert_eq!(
            out,
            b"GET /foo HTTP/1.1\r\nHost: example.test\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn parent_mode_keeps_absolute_url_as_received() {
        let out = forward(
            b"GET http://example.test/foo?q=1 HTTP/1.1\r\nHost: example.test\r\n\r\n",
            ForwardMode::Parent,
        )
        .await;
        assert!(out.starts_with(b"GET http://example.test/foo?q=1 HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn hop_by_hop_headers_are_dropped_and_replaced() {
        let out = forward(
            b"GET http://example.test/ HTTP/1.1\r\n\
              Keep-Alive: 300\r\n\
              proxy-connection: keep-alive\r\n\
              CONNECTION: keep-alive\r\n\
              Content-Type: text/html\r\n\
              \r\n",
            ForwardMode::Direct,
        )
        .await;
        assert_eq!(
            out,
            b"GET / HTTP/1.1\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn direct_mode_forwards_path_and_query_as_sent() {
        let out = forward(
            b"GET http://h/a/../b/%7e/x|y?q=a\"b#top HTTP/1.1\r\n\r\n",
            ForwardMode::Direct,
        )
        .await;
        assert!(out.starts_with(b"GET /a/../b/%7e/x|y?q=a\"b HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn non_utf8_header_bytes_are_forwarded_unchanged() {
        let out = forward(
            b"GET http://example.test/ HTTP/1.1\r\nX-Name: caf\xe9\r\n\r\n",
            ForwardMode::Direct,
        )
        .await;
        assert_eq!(out, b"GET / HTTP/1.1\r\nX-Name: caf\xe9\r\nConnection: close\r\n\r\n");
    }

    #[tokio::test]
    async fn copies_exactly_content_length_binary_bytes() {
        let mut raw = b"POST http://example.test/up HTTP/1.1\r\nContent-Length: 6\r\n\r\n".to_vec();
        raw.extend_from_slice(&[0, 1, 0xff, b'\r', b'\n', 7, 8, 9]);

        let (req, mut reader) = request(&raw).await;
        let out = OutboundRequest::prepare(&req, ForwardMode::Direct).unwrap();
        assert_eq!(out.body_len(), 6);

        let mut upstream = Vec::new();
        assert_eq!(out.send(&mut reader, &mut upstream).await.unwrap(), 6);
        assert!(upstream.ends_with(&[b'\n', 0, 1, 0xff, b'\r', b'\n']));
        assert_eq!(reader.buffered(), &[7, 8, 9]);
    }

    #[tokio::test]
    async fn no_content_length_means_no_body() {
        let out = forward(
            b"POST http://example.test/ HTTP/1.1\r\nHost: a\r\n\r\ntrailing bytes",
            ForwardMode::Direct,
        )
        .await;
        assert!(out.ends_with(b"Connection: close\r\n\r\n"));
    }

    #[tokio::test]
    async fn short_body_is_not_an_error() {
        let (req, mut reader) =
            request(b"POST http://example.test/ HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").await;
        let out = OutboundRequest::prepare(&req, ForwardMode::Direct).unwrap();
        let mut upstream = Vec::new();
        assert_eq!(out.send(&mut reader, &mut upstream).await.unwrap(), 3);
        assert!(upstream.ends_with(b"\r\n\r\nabc"));
    }

    #[tokio::test]
    async fn last_content_length_wins() {
        let (req, _) = request(
            b"POST http://example.test/ HTTP/1.1\r\nContent-Length: 2\r\ncontent-length: 4\r\n\r\n",
        )
        .await;
        let out = OutboundRequest::prepare(&req, ForwardMode::Direct).unwrap();
        assert_eq!(out.body_len(), 4);
    }

    #[tokio::test]
    async fn malformed_content_length_is_a_parse_error() {
        for bad in ["abc", "-1", ""] {
            let raw = format!("POST http://example.test/ HTTP/1.1\r\nContent-Length: {bad}\r\n\r\n");
            let (req, _) = request(raw.as_bytes()).await;
            let err = OutboundRequest::prepare(&req, ForwardMode::Direct).unwrap_err();
            assert!(matches!(err, ParseError::InvalidContentLength(_)), "{bad}");
        }
    }
}
