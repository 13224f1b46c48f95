//! Buffered line framing.
//!
//! One `LineReader` wraps each socket's read half for the whole life of a
//! connection, so bytes that arrive together with a header block (the start
//! of a body) stay in the buffer and are seen by the body copy that follows.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Duration};

use crate::{HttpError, ParseError};

const READ_CHUNK: usize = 8 * 1024;

pub struct LineReader<R> {
    inner: R,
    buf: BytesMut,
    read_timeout: Duration,
    max_line: Option<usize>,
}

impl<R> LineReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Every read on `inner` fails with `TimedOut` once `read_timeout`
    /// passes without data.
    pub fn new(inner: R, read_timeout: Duration) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
            read_timeout,
            max_line: None,
        }
    }

    /// Lines longer than `max` bytes fail with `ParseError::LineTooLong`.
    pub fn with_max_line(mut self, max: usize) -> Self {
        self.max_line = Some(max);
        self
    }

    /// Bytes read from the socket but not consumed yet.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Reads one line terminated by `\n`. Carriage returns are dropped.
    ///
    /// Returns `None` when the stream ends before any byte of a new line,
    /// which is distinct from `Some(vec![])` for a blank line. A final line
    /// without terminator is returned as-is.
    pub async fn read_line(&mut self) -> Result<Option<Vec<u8>>, HttpError> {
        let mut scanned = 0;

        loop {
            if let Some(pos) = self.buf[scanned..].iter().position(|&b| b == b'\n') {
                let end = scanned + pos;
                self.check_len(end)?;
                let raw = self.buf.split_to(end + 1);
                return Ok(Some(strip_cr(&raw[..end])));
            }
            scanned = self.buf.len();
            self.check_len(scanned)?;

            if self.fill().await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let raw = self.buf.split();
                return Ok(Some(strip_cr(&raw)));
            }
        }
    }

    /// Copies up to `len` bytes to `out`, stopping quietly at end of stream.
    /// Returns how many bytes were copied.
    pub async fn copy_exact<W>(&mut self, len: u64, out: &mut W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut remaining = len;

        while remaining > 0 {
            if self.buf.is_empty() && self.fill().await? == 0 {
                break;
            }
            let take = remaining.min(self.buf.len() as u64) as usize;
            let chunk = self.buf.split_to(take);
            out.write_all(&chunk).await?;
            remaining -= take as u64;
        }

        Ok(len - remaining)
    }

    /// Copies everything left on the stream to `out`.
    pub async fn copy_to_end<W>(&mut self, out: &mut W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut total = 0u64;

        loop {
            if self.buf.is_empty() && self.fill().await? == 0 {
                return Ok(total);
            }
            let chunk = self.buf.split();
            out.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
    }

    fn check_len(&self, len: usize) -> Result<(), ParseError> {
        match self.max_line {
            Some(max) if len > max => Err(ParseError::LineTooLong(max)),
            _ => Ok(()),
        }
    }

    async fn fill(&mut self) -> io::Result<usize> {
        self.buf.reserve(READ_CHUNK);
        match timeout(self.read_timeout, self.inner.read_buf(&mut self.buf)).await {
            Ok(res) => res,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no data for {}s", self.read_timeout.as_secs_f32()),
            )),
        }
    }
}

fn strip_cr(raw: &[u8]) -> Vec<u8> {
    raw.iter().copied().filter(|&b| b != b'\r').collect()
}
