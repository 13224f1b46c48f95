use std::io;

use tabou_http::{HttpError, LineReader};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};

/// Copies the upstream response to the client.
///
/// Status line and headers go back line by line with CRLF endings and no
/// filtering. The body is copied until upstream closes; its length headers
/// are not consulted because the request always asked for `Connection: close`.
/// Returns the number of body bytes relayed.
#[instrument(skip_all)]
pub async fn relay_response<R, W>(
    upstream: &mut LineReader<R>,
    client: &mut W,
) -> Result<u64, HttpError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let Some(status) = upstream.read_line().await? else {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "upstream closed before sending a status line",
        )
        .into());
    };
    debug!(
        target: "tabou::proxy",
        status_line = %String::from_utf8_lossy(&status),
        "Received upstream status line"
    );
    client.write_all(&status).await?;
    client.write_all(b"\r\n").await?;

    while let Some(line) = upstream.read_line().await? {
        if line.is_empty() {
            client.write_all(b"\r\n").await?;
            break;
        }
        debug!(
            target: "tabou::proxy",
            header = %String::from_utf8_lossy(&line),
            "Relaying response header"
        );
        client.write_all(&line).await?;
        client.write_all(b"\r\n").await?;
    }

    let body = upstream.copy_to_end(client).await?;
    client.flush().await?;

    debug!(target: "tabou::proxy", body_bytes = body, "Upstream response relayed");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    async fn relay(upstream: &[u8]) -> Result<(Vec<u8>, u64), HttpError> {
        let mut reader = LineReader::new(upstream, Duration::from_secs(5));
        let mut client = Vec::new();
        let n = relay_response(&mut reader, &mut client).await?;
        Ok((client, n))
    }

    #[tokio::test]
    async fn crlf_response_is_copied_byte_for_byte() {
        let raw = b"HTTP/1.1 200 OK\r\n\
                    Content-Length: 5\r\n\
                    Connection: keep-alive\r\n\
                    Keep-Alive: timeout=5\r\n\
                    Set-Cookie: a=1\r\n\
                    Set-Cookie: b=2\r\n\
                    \r\n\
                    he\x00lo";
        let (out, n) = relay(raw).await.unwrap();
        assert_eq!(out, raw.to_vec());
        assert_eq!(n, 5);
    }

    #[tokio::test]
    async fn lf_only_head_is_normalised_to_crlf() {
        let (out, _) = relay(b"HTTP/1.0 404 Not Found\nX-A: 1\n\nbody\nline").await.unwrap();
        assert_eq!(out, b"HTTP/1.0 404 Not Found\r\nX-A: 1\r\n\r\nbody\nline");
    }

    #[tokio::test]
    async fn body_is_read_to_eof_regardless_of_content_length() {
        let (out, n) = relay(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nmore than two")
            .await
            .unwrap();
        assert!(out.ends_with(b"\r\n\r\nmore than two"));
        assert_eq!(n, 13);
    }

    #[tokio::test]
    async fn head_cut_short_is_relayed_as_is() {
        let (out, n) = relay(b"HTTP/1.1 200 OK\r\nX-A: 1").await.unwrap();
        assert_eq!(out, b"HTTP/1.1 200 OK\r\nX-A: 1\r\n");
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn silent_upstream_is_an_io_error() {
        match relay(b"").await {
            Err(HttpError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected EOF error, got {other:?}"),
        }
    }
}
