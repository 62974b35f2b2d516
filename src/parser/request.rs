//! HTTP request representation and the incremental request parser.

use std::collections::HashMap;
use std::str::FromStr;

use log::{debug, trace};

use crate::parser::buffer::{LineStatus, ReadBuffer, READ_BUFFER_SIZE};
use crate::parser::error::Error;
use crate::parser::form::{parse_urlencoded, FORM_URLENCODED};
use crate::parser::method::Method;
use crate::parser::version::HttpVersion;

/// Logical page names that are served from `<name>.html`.
const BARE_PAGES: [&str; 6] = ["/index", "/register", "/login", "/welcome", "/video", "/picture"];

/// Represents an HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    /// The HTTP method (GET or POST)
    pub method: Method,
    /// The request path, after scheme stripping and page-name rewriting
    pub path: String,
    /// The HTTP version
    pub version: HttpVersion,
    /// The HTTP headers, keyed by lowercase name
    pub headers: HashMap<String, String>,
    /// Value of the Content-Length header, 0 when absent
    pub content_length: usize,
    /// Whether the client asked for `Connection: keep-alive`
    pub keep_alive: bool,
    /// Value of the Host header
    pub host: Option<String>,
    /// The request body
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Get a header value (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&String> {
        self.headers.get(&name.to_ascii_lowercase())
    }

    /// Check if a header exists (case-insensitive).
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(&name.to_ascii_lowercase())
    }

    /// Stores a header, replacing any earlier value under the same name.
    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Check if the request carries a url-encoded form.
    pub fn is_form(&self) -> bool {
        self.method == Method::POST
            && self
                .get_header("Content-Type")
                .is_some_and(|ct| ct.as_str() == FORM_URLENCODED)
    }

    /// Decode the body as a url-encoded form.
    pub fn form(&self) -> HashMap<String, String> {
        parse_urlencoded(&self.body)
    }
}

/// Where the parser is within the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseState {
    #[default]
    RequestLine,
    Headers,
    Body,
}

/// Non-error outcome of a parse pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// More bytes are needed.
    Incomplete,
    /// The request line, headers and body are all in.
    Complete,
}

/// Incremental parser driven over a connection's [`ReadBuffer`].
///
/// The state survives between calls, so the parser can be fed one
/// non-blocking read at a time.
#[derive(Debug, Default)]
pub struct RequestParser {
    state: ParseState,
    request: HttpRequest,
}

impl RequestParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut HttpRequest {
        &mut self.request
    }

    /// Clears the request and starts over at the request line.
    pub fn reset(&mut self) {
        self.state = ParseState::RequestLine;
        self.request = HttpRequest::default();
    }

    /// Consumes every complete line in `buf`.
    ///
    /// Stops when the request is complete, when more bytes are needed, or on
    /// the first protocol error.
    pub fn parse(&mut self, buf: &mut ReadBuffer) -> Result<ParseStatus, Error> {
        loop {
            if self.state == ParseState::Body {
                return Ok(self.parse_body(buf));
            }

            let range = match buf.scan_line() {
                LineStatus::Complete(range) => range,
                LineStatus::Incomplete => return Ok(ParseStatus::Incomplete),
                LineStatus::Malformed => return Err(Error::MalformedLine),
            };
            let line = buf.line(range);

            let status = match self.state {
                ParseState::RequestLine => self.parse_request_line(line)?,
                _ => self.parse_header(line)?,
            };
            if status == ParseStatus::Complete {
                return Ok(status);
            }
        }
    }

    fn parse_request_line(&mut self, line: &[u8]) -> Result<ParseStatus, Error> {
        let line = std::str::from_utf8(line)
            .map_err(|_| Error::MalformedRequestLine(String::from_utf8_lossy(line).into_owned()))?;
        debug!("request line: {line}");

        let parts: Vec<&str> = line.split([' ', '\t']).filter(|s| !s.is_empty()).collect();
        if parts.len() != 3 {
            return Err(Error::MalformedRequestLine(line.to_string()));
        }

        self.request.method = Method::from_str(parts[0])?;
        self.request.version = HttpVersion::from_str(parts[2])?;
        self.request.path = normalize_target(parts[1])?;
        self.state = ParseState::Headers;
        Ok(ParseStatus::Incomplete)
    }

    fn parse_header(&mut self, line: &[u8]) -> Result<ParseStatus, Error> {
        if line.is_empty() {
            if self.request.content_length > 0 {
                self.state = ParseState::Body;
                return Ok(ParseStatus::Incomplete);
            }
            return Ok(ParseStatus::Complete);
        }

        let line = std::str::from_utf8(line).map_err(|_| Error::InvalidHeaderFormat)?;
        let (name, value) = line.split_once(':').ok_or(Error::InvalidHeaderFormat)?;
        let name = name.trim_end();
        if name.is_empty() {
            return Err(Error::InvalidHeaderFormat);
        }
        let value = value.trim_matches([' ', '\t']);
        trace!("header {name}: {value}");

        if name.eq_ignore_ascii_case("Connection") {
            self.request.keep_alive = value.eq_ignore_ascii_case("keep-alive");
        } else if name.eq_ignore_ascii_case("Content-Length") {
            let length = value
                .parse::<usize>()
                .map_err(|_| Error::InvalidContentLength(value.to_string()))?;
            if length > READ_BUFFER_SIZE {
                return Err(Error::RequestTooLarge);
            }
            self.request.content_length = length;
        } else if name.eq_ignore_ascii_case("Host") {
            self.request.host = Some(value.to_string());
        }

        self.request.insert_header(name, value);
        Ok(ParseStatus::Incomplete)
    }

    fn parse_body(&mut self, buf: &mut ReadBuffer) -> ParseStatus {
        let length = self.request.content_length;
        let pending = buf.unparsed();
        if pending.len() < length {
            return ParseStatus::Incomplete;
        }
        self.request.body = pending[..length].to_vec();
        buf.consume(length);
        ParseStatus::Complete
    }
}

/// Strips an absolute-form prefix and applies the page-name rewrites.
fn normalize_target(target: &str) -> Result<String, Error> {
    let mut path = target;
    for scheme in ["http://", "https://"] {
        if path.get(..scheme.len()).is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme)) {
            let rest = &path[scheme.len()..];
            path = rest.find('/').map(|idx| &rest[idx..]).ok_or(Error::InvalidPath)?;
        }
    }

    if !path.starts_with('/') {
        return Err(Error::InvalidPath);
    }

    if path == "/" {
        return Ok("/index.html".to_string());
    }
    if BARE_PAGES.contains(&path) {
        return Ok(format!("{path}.html"));
    }
    Ok(path.to_string())
}

/// Parse a complete HTTP request from a byte slice.
///
/// # Examples
///
/// ```
/// use tinyweb::parse_request;
///
/// let request = parse_request(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
///
/// assert_eq!(request.method.to_string(), "GET");
/// assert_eq!(request.path, "/index.html");
/// assert_eq!(request.get_header("host"), Some(&"example.com".to_string()));
/// ```
pub fn parse_request(input: &[u8]) -> Result<HttpRequest, Error> {
    if input.is_empty() {
        return Err(Error::EmptyRequest);
    }

    let mut buf = ReadBuffer::new();
    if buf.fill_from(input) < input.len() {
        return Err(Error::RequestTooLarge);
    }

    let mut parser = RequestParser::new();
    match parser.parse(&mut buf)? {
        ParseStatus::Complete => Ok(parser.request),
        ParseStatus::Incomplete => Err(Error::Incomplete),
    }
}
