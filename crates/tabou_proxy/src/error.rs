use std::io;

use tabou_http::{HttpError, ParseError};

/// The outbound connection could not be opened (DNS, refused, timeout).
#[derive(Debug, thiserror::Error)]
#[error("cannot connect to {target}: {reason}")]
pub struct UpstreamConnectError {
    pub target: String,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    UpstreamConnect(#[from] UpstreamConnectError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RelayError {
    /// Errors raised before anything was sent to the client get a
    /// synthetic 500; I/O failures mid-relay only close the connection.
    pub fn reports_to_client(&self) -> bool {
        matches!(self, RelayError::Parse(_) | RelayError::UpstreamConnect(_))
    }
}

impl From<HttpError> for RelayError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Parse(e) => RelayError::Parse(e),
            HttpError::Io(e) => RelayError::Io(e),
        }
    }
}
