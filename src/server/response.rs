//! HTTP response assembly.
//!
//! The status line and headers are formatted into a fixed write buffer. A
//! file body is never copied: the [`Transmission`] describes it as a second
//! range that points into the mapped file.

use std::fmt;
use std::io::{Cursor, IoSlice, Write};
use std::ops::Range;
use std::path::Path;

use crate::server::error::Error;

/// Capacity of the per-connection write buffer.
pub const WRITE_BUFFER_SIZE: usize = 1024;

/// Body sent for a zero-length file.
pub const EMPTY_FILE_BODY: &str = "<html><body></body></html>";

/// File suffix to media type.
const CONTENT_TYPES: [(&str, &str); 19] = [
    (".html", "text/html"),
    (".xml", "text/xml"),
    (".xhtml", "application/xhtml+xml"),
    (".txt", "text/plain"),
    (".rtf", "application/rtf"),
    (".pdf", "application/pdf"),
    (".word", "application/nsword"),
    (".png", "image/png"),
    (".gif", "image/gif"),
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".au", "audio/basic"),
    (".mpeg", "video/mpeg"),
    (".mpg", "video/mpeg"),
    (".avi", "video/x-msvideo"),
    (".gz", "application/x-gzip"),
    (".tar", "application/x-tar"),
    (".css", "text/css"),
    (".js", "text/javascript"),
];

/// HTTP status codes with their standard reason phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 200,
    BadRequest = 400,
    Forbidden = 403,
    NotFound = 404,
    InternalServerError = 500,
}

impl StatusCode {
    /// Get the reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }

    /// Canned body for error responses.
    pub fn error_body(&self) -> &'static str {
        match self {
            StatusCode::Ok => EMPTY_FILE_BODY,
            StatusCode::BadRequest => {
                "Your request has bad syntax or is inherently impossible to satisfy.\n"
            }
            StatusCode::Forbidden => "You do not have permission to get file from this server.\n",
            StatusCode::NotFound => "The requested file was not found on this server.\n",
            StatusCode::InternalServerError => {
                "There was an unusual problem serving the requested file.\n"
            }
        }
    }

    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

/// Media type for a file, chosen by the suffix after its last `.`.
pub fn content_type_for(path: &Path) -> &'static str {
    let name = path.to_string_lossy();
    let Some(idx) = name.rfind('.') else {
        return "text/plain";
    };
    let suffix = &name[idx..];
    CONTENT_TYPES
        .iter()
        .find(|(ext, _)| *ext == suffix)
        .map(|(_, media)| *media)
        .unwrap_or("text/plain")
}

/// Fixed-capacity buffer holding the response head, and for error
/// responses the body as well.
pub struct WriteBuffer {
    buf: Box<[u8; WRITE_BUFFER_SIZE]>,
    write_idx: usize,
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self {
            buf: Box::new([0u8; WRITE_BUFFER_SIZE]),
            write_idx: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.write_idx
    }

    pub fn is_empty(&self) -> bool {
        self.write_idx == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.write_idx]
    }

    pub fn clear(&mut self) {
        self.write_idx = 0;
    }

    /// Formats `args` at the end of the buffer.
    ///
    /// Nothing is committed when the text does not fit.
    pub fn append(&mut self, args: fmt::Arguments<'_>) -> Result<(), Error> {
        let mut cursor = Cursor::new(&mut self.buf[self.write_idx..]);
        cursor.write_fmt(args).map_err(|_| Error::HeaderOverflow)?;
        self.write_idx += cursor.position() as usize;
        Ok(())
    }

    fn status_line(&mut self, status: StatusCode) -> Result<(), Error> {
        self.append(format_args!(
            "HTTP/1.1 {} {}\r\n",
            status.as_u16(),
            status.reason_phrase()
        ))
    }

    fn headers(&mut self, content_length: usize, content_type: &str, keep_alive: bool) -> Result<(), Error> {
        self.append(format_args!(
            "Content-Length: {content_length}\r\nContent-Type: {content_type}\r\nConnection: {}\r\n\r\n",
            if keep_alive { "keep-alive" } else { "close" }
        ))
    }
}

/// Up to two byte ranges queued for a scatter/gather write: the head in the
/// write buffer, then the mapped file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transmission {
    head: Range<usize>,
    file: Range<usize>,
    bytes_to_send: usize,
    bytes_have_send: usize,
}

impl Transmission {
    fn new(head_len: usize, file_len: usize) -> Self {
        Self {
            head: 0..head_len,
            file: 0..file_len,
            bytes_to_send: head_len + file_len,
            bytes_have_send: 0,
        }
    }

    /// Bytes still queued.
    pub fn bytes_to_send(&self) -> usize {
        self.bytes_to_send
    }

    /// Bytes already handed to the socket.
    pub fn bytes_have_send(&self) -> usize {
        self.bytes_have_send
    }

    pub fn is_done(&self) -> bool {
        self.bytes_to_send == 0
    }

    /// Number of ranges that still hold bytes.
    pub fn range_count(&self) -> usize {
        usize::from(!self.head.is_empty()) + usize::from(!self.file.is_empty())
    }

    /// Descriptors for the remaining bytes, head first.
    pub fn io_slices<'a>(&self, head: &'a [u8], file: &'a [u8]) -> ([IoSlice<'a>; 2], usize) {
        let head = &head[self.head.clone()];
        let file = &file[self.file.clone()];
        if head.is_empty() {
            ([IoSlice::new(file), IoSlice::new(&[])], self.range_count())
        } else {
            ([IoSlice::new(head), IoSlice::new(file)], self.range_count())
        }
    }

    /// Records a write of `n` bytes, shrinking the head range before the
    /// file range.
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.bytes_to_send);
        self.bytes_have_send += n;
        self.bytes_to_send -= n;

        let from_head = n.min(self.head.len());
        self.head.start += from_head;
        self.file.start += n - from_head;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Writes a `200 OK` head for a file of `file_len` bytes.
///
/// A non-empty file is sent from its mapping after the head. An empty file
/// gets a small placeholder page in the write buffer.
pub fn build_file_response(
    buf: &mut WriteBuffer,
    path: &Path,
    file_len: usize,
    keep_alive: bool,
) -> Result<Transmission, Error> {
    buf.status_line(StatusCode::Ok)?;
    if file_len == 0 {
        buf.headers(EMPTY_FILE_BODY.len(), content_type_for(path), keep_alive)?;
        buf.append(format_args!("{EMPTY_FILE_BODY}"))?;
        return Ok(Transmission::new(buf.len(), 0));
    }
    buf.headers(file_len, content_type_for(path), keep_alive)?;
    Ok(Transmission::new(buf.len(), file_len))
}

/// Writes a complete error response, body included, into the write buffer.
pub fn build_error_response(
    buf: &mut WriteBuffer,
    status: StatusCode,
    keep_alive: bool,
) -> Result<Transmission, Error> {
    let body = status.error_body();
    buf.status_line(status)?;
    buf.headers(body.len(), "text/html", keep_alive)?;
    buf.append(format_args!("{body}"))?;
    Ok(Transmission::new(buf.len(), 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_lookup() {
        assert_eq!(content_type_for(Path::new("/srv/index.html")), "text/html");
        assert_eq!(content_type_for(Path::new("/srv/a.b/photo.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("/srv/style.css")), "text/css");
        assert_eq!(content_type_for(Path::new("/srv/README")), "text/plain");
        assert_eq!(content_type_for(Path::new("/srv/data.bin")), "text/plain");
    }

    #[test]
    fn test_error_response_bytes() {
        let mut buf = WriteBuffer::new();
        let tx = build_error_response(&mut buf, StatusCode::NotFound, false).unwrap();
        let body = StatusCode::NotFound.error_body();
        let expected = format!(
            "HTTP/1.1 404 Not Found\r\nContent-Length: {}\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        assert_eq!(buf.as_slice(), expected.as_bytes());
        assert_eq!(tx.bytes_to_send(), expected.len());
        assert_eq!(tx.range_count(), 1);
    }

    #[test]
    fn test_file_response_uses_two_ranges() {
        let mut buf = WriteBuffer::new();
        let tx = build_file_response(&mut buf, Path::new("/srv/a.png"), 5000, true).unwrap();
        let head = String::from_utf8_lossy(buf.as_slice()).into_owned();
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Content-Length: 5000\r\n"));
        assert!(head.contains("Content-Type: image/png\r\n"));
        assert!(head.ends_with("Connection: keep-alive\r\n\r\n"));
        assert_eq!(tx.range_count(), 2);
        assert_eq!(tx.bytes_to_send(), buf.len() + 5000);
    }

    #[test]
    fn test_empty_file_gets_placeholder_body() {
        let mut buf = WriteBuffer::new();
        let tx = build_file_response(&mut buf, Path::new("/srv/empty.html"), 0, false).unwrap();
        assert!(buf.as_slice().ends_with(EMPTY_FILE_BODY.as_bytes()));
        assert_eq!(tx.range_count(), 1);
        assert_eq!(tx.bytes_to_send(), buf.len());
    }

    #[test]
    fn test_append_overflow_commits_nothing() {
        let mut buf = WriteBuffer::new();
        let filler = "x".repeat(WRITE_BUFFER_SIZE - 4);
        buf.append(format_args!("{filler}")).unwrap();
        let before = buf.len();
        assert!(matches!(buf.append(format_args!("too long")), Err(Error::HeaderOverflow)));
        assert_eq!(buf.len(), before);
    }

    #[test]
    fn test_transmission_advance_moves_head_then_file() {
        let head = b"HEAD".to_vec();
        let file = b"0123456789".to_vec();
        let mut tx = Transmission::new(head.len(), file.len());

        tx.advance(2);
        let (slices, count) = tx.io_slices(&head, &file);
        assert_eq!(count, 2);
        assert_eq!(&*slices[0], b"AD");
        assert_eq!(&*slices[1], b"0123456789");

        tx.advance(5);
        let (slices, count) = tx.io_slices(&head, &file);
        assert_eq!(count, 1);
        assert_eq!(&*slices[0], b"3456789");
        assert_eq!(tx.bytes_have_send(), 7);
        assert_eq!(tx.bytes_to_send(), 7);

        tx.advance(7);
        assert!(tx.is_done());
        assert_eq!(tx.range_count(), 0);
    }
}
