//! A small, high-throughput HTTP/1.1 engine.
//!
//! This library turns bytes arriving on a non-blocking socket into a parsed
//! request, picks the file that answers it, and sends the response with the
//! file body straight from a memory mapping.
//!
//! # Features
//!
//! - Incremental parsing over a fixed 2 KiB read buffer, safe for both
//!   level-triggered and edge-triggered readiness
//! - GET and POST, HTTP/1.1 only, keep-alive
//! - `application/x-www-form-urlencoded` login and register forms backed by a
//!   pluggable credential store
//! - Zero-copy file responses via scatter/gather writes with partial-write
//!   resumption
//! - A mio-based multi-worker dispatcher with idle timeouts
//!
//! # Examples
//!
//! ## Parsing a request
//!
//! ```
//! use tinyweb::{parse_request, Method};
//!
//! let request = parse_request(b"GET /login HTTP/1.1\r\nConnection: keep-alive\r\n\r\n").unwrap();
//!
//! assert_eq!(request.method, Method::GET);
//! assert_eq!(request.path, "/login.html");
//! assert!(request.keep_alive);
//! ```
//!
//! ## Error handling
//!
//! ```
//! use tinyweb::{parse_request, ParserError};
//!
//! match parse_request(b"GET /index.html HTTP/1.0\r\n\r\n") {
//!     Ok(_) => println!("Request parsed successfully"),
//!     Err(ParserError::InvalidVersion(version)) => println!("Unsupported version: {version}"),
//!     Err(err) => println!("Other error: {err}"),
//! }
//! ```
//!
//! ## Running a server
//!
//! ```no_run
//! use tinyweb::{HttpServer, ServerConfig};
//!
//! let config = ServerConfig {
//!     doc_root: "./root".into(),
//!     ..ServerConfig::default()
//! };
//! HttpServer::new(config)?.start()?;
//! # Ok::<(), tinyweb::ServerError>(())
//! ```
//!
//! See the `demos` directory for a runnable static file server.

// Export the parser module
pub mod parser;

// Export the server module
pub mod server;

// Re-export commonly used items for convenience
pub use parser::{Error as ParserError, HttpRequest, HttpVersion, Method, parse_request};
pub use server::{
    Connection, CredentialStore, Disposition, Error as ServerError, HttpServer,
    MemoryCredentialStore, ServerConfig, StatusCode, TriggerMode,
};
