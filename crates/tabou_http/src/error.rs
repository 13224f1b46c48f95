use std::io;

/// The request could not be understood. Reported to the client as a
/// synthetic 500.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),
    #[error("invalid request target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },
    #[error("malformed header line (no ':'): {0:?}")]
    MalformedHeader(String),
    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
