use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Builds the proxy's own error response.
///
/// The message is the reason phrase and also the body. CR/LF are blanked
/// in the status line only.
pub fn error_response(message: &str) -> Vec<u8> {
    let reason: String = message
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();

    format!(
        "HTTP/1.0 500 {reason}\r\n\
         Content-type: text/plain\r\n\
         Connection: close\r\n\
         \r\n\
         {message}"
    )
    .into_bytes()
}

/// Writes the synthetic `HTTP/1.0 500` and flushes.
pub async fn send_500<W>(stream: &mut W, message: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    stream.write_all(&error_response(message)).await?;
    stream.flush().await?;
    Ok(())
}
