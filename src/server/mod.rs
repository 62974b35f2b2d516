//! HTTP server implementation for tinyweb.
//!
//! The [`Connection`] driver is the engine: it reads from a non-blocking
//! socket, parses, resolves the target file and writes the response with
//! zero-copy file bodies. [`HttpServer`] is a small mio-based dispatcher
//! around it.

mod config;
mod connection;
mod credentials;
mod error;
mod handler;
mod http_server;
mod poller;
mod resolver;
mod response;
mod slab;
mod timer;
mod tests;

// Re-export public items
pub use config::{ServerConfig, TriggerMode};
pub use connection::{Connection, Disposition};
pub use credentials::{CredentialStore, MemoryCredentialStore, RegisterOutcome, VerifyOutcome};
pub use error::Error;
pub use handler::{
    RequestHandler, ERROR_PAGE, LOGIN_PAGE, REGISTER_ERROR_PAGE, REGISTER_PAGE, WELCOME_PAGE,
};
pub use http_server::HttpServer;
pub use poller::{Interest, Poller};
pub use resolver::{FileResource, MappedFile, Resolver, ShortcutTable, FILENAME_LEN};
pub use response::{
    build_error_response, build_file_response, content_type_for, StatusCode, Transmission,
    WriteBuffer, EMPTY_FILE_BODY, WRITE_BUFFER_SIZE,
};
pub use timer::IdleTimer;
