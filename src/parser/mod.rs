//! HTTP parser module.
//!
//! Requests are parsed incrementally: a line scanner frames CRLF-terminated
//! lines inside a fixed read buffer, and a three-state machine turns those
//! lines into an [`HttpRequest`].

mod buffer;
mod error;
mod form;
mod method;
mod request;
mod version;

// Re-export public items
pub use buffer::{LineStatus, ReadBuffer, READ_BUFFER_SIZE};
pub use error::Error;
pub use form::{parse_urlencoded, FORM_URLENCODED};
pub use method::Method;
pub use request::{HttpRequest, ParseState, ParseStatus, RequestParser};
pub use version::HttpVersion;

// Re-export the parse_request function
pub use request::parse_request;
