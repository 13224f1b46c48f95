//! Line-oriented HTTP/1.x plumbing shared by the request and response paths.

mod error;
pub mod framing;
pub mod request;
pub mod responses;

pub use error::{HttpError, ParseError};
pub use framing::LineReader;
pub use request::{read_request, HeaderLine, IncomingRequest, RequestLine};
