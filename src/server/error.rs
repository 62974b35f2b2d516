//! Error types for the HTTP server.

use std::path::PathBuf;

use thiserror::Error;

use crate::parser::Error as ParserError;
use crate::server::response::StatusCode;

/// Errors that can occur while answering a request or running the server.
#[derive(Debug, Error)]
pub enum Error {
    /// Error parsing an HTTP request.
    #[error("Parse error: {0}")]
    ParseError(#[from] ParserError),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration or seed file could not be decoded.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The requested file does not exist.
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The requested file is not world-readable.
    #[error("Forbidden: {}", .0.display())]
    Forbidden(PathBuf),

    /// The requested path names a directory.
    #[error("Is a directory: {}", .0.display())]
    IsDirectory(PathBuf),

    /// The response head does not fit into the write buffer.
    #[error("Response head exceeds the write buffer")]
    HeaderOverflow,

    /// The credential store failed.
    #[error("Credential storage error: {0}")]
    StorageError(String),

    /// Internal server error.
    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl Error {
    /// The status line a client sees for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::ParseError(_) | Error::IsDirectory(_) => StatusCode::BadRequest,
            Error::NotFound(_) => StatusCode::NotFound,
            Error::Forbidden(_) => StatusCode::Forbidden,
            _ => StatusCode::InternalServerError,
        }
    }
}
