//! Error types for the HTTP parser.

use thiserror::Error;

/// Errors that can occur during HTTP request parsing.
///
/// Every variant is a protocol error: the connection answers with
/// `400 Bad Request` and is closed afterwards.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The HTTP method in the request is not supported.
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// The request path is invalid or missing.
    #[error("Invalid HTTP path")]
    InvalidPath,

    /// The request line is malformed (wrong format or missing components).
    #[error("Malformed request line: {0}")]
    MalformedRequestLine(String),

    /// The HTTP version in the request is not supported.
    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    /// A header in the request has an invalid format.
    #[error("Invalid header format")]
    InvalidHeaderFormat,

    /// A line feed arrived without the carriage return in front of it.
    #[error("Malformed line terminator")]
    MalformedLine,

    /// The Content-Length header is not a non-negative integer.
    #[error("Invalid Content-Length: {0}")]
    InvalidContentLength(String),

    /// The request does not fit into the read buffer.
    #[error("Request exceeds the read buffer")]
    RequestTooLarge,

    /// The input ended before the request was complete.
    #[error("Incomplete request")]
    Incomplete,

    /// The request is empty.
    #[error("Empty request")]
    EmptyRequest,
}
