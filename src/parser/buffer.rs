//! Fixed-capacity read buffer and the CRLF line scanner that runs over it.

use std::ops::Range;

/// Capacity of the per-connection read buffer.
pub const READ_BUFFER_SIZE: usize = 2048;

/// Byte written over a consumed line terminator.
const SENTINEL: u8 = 0;

/// Result of scanning for the next line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineStatus {
    /// A full line was found. The range excludes the terminator.
    Complete(Range<usize>),
    /// No terminator in the buffered bytes yet.
    Incomplete,
    /// A line feed without a carriage return in front of it.
    Malformed,
}

/// The bytes read from a connection and the scanner's position in them.
///
/// Invariant: `start_line <= checked_idx <= read_idx <= READ_BUFFER_SIZE`.
pub struct ReadBuffer {
    buf: Box<[u8; READ_BUFFER_SIZE]>,
    read_idx: usize,
    checked_idx: usize,
    start_line: usize,
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self {
            buf: Box::new([0u8; READ_BUFFER_SIZE]),
            read_idx: 0,
            checked_idx: 0,
            start_line: 0,
        }
    }

    /// End of valid data.
    pub fn read_idx(&self) -> usize {
        self.read_idx
    }

    /// Position the scanner resumes from.
    pub fn checked_idx(&self) -> usize {
        self.checked_idx
    }

    /// Start of the line currently being assembled.
    pub fn start_line(&self) -> usize {
        self.start_line
    }

    pub fn is_full(&self) -> bool {
        self.read_idx >= READ_BUFFER_SIZE
    }

    /// The unfilled tail, handed to `recv`.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.read_idx..]
    }

    /// Marks `n` bytes of the spare tail as filled.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.read_idx + n <= READ_BUFFER_SIZE);
        self.read_idx = (self.read_idx + n).min(READ_BUFFER_SIZE);
    }

    /// Copies as much of `data` as fits and returns the number of bytes taken.
    pub fn fill_from(&mut self, data: &[u8]) -> usize {
        let spare = self.spare_mut();
        let n = spare.len().min(data.len());
        spare[..n].copy_from_slice(&data[..n]);
        self.advance(n);
        n
    }

    /// Scans forward from the last checked position for a CRLF.
    ///
    /// On success both terminator bytes are overwritten with a sentinel and
    /// the cursor moves past them, so no byte is looked at twice across
    /// partial reads.
    pub fn scan_line(&mut self) -> LineStatus {
        while self.checked_idx < self.read_idx {
            match self.buf[self.checked_idx] {
                b'\r' => {
                    if self.checked_idx + 1 == self.read_idx {
                        return LineStatus::Incomplete;
                    }
                    if self.buf[self.checked_idx + 1] != b'\n' {
                        return LineStatus::Malformed;
                    }
                    let end = self.checked_idx;
                    self.buf[end] = SENTINEL;
                    self.buf[end + 1] = SENTINEL;
                    self.checked_idx += 2;
                    return self.finish_line(end);
                }
                b'\n' => {
                    if self.checked_idx > 0 && self.buf[self.checked_idx - 1] == b'\r' {
                        let end = self.checked_idx - 1;
                        self.buf[end] = SENTINEL;
                        self.buf[self.checked_idx] = SENTINEL;
                        self.checked_idx += 1;
                        return self.finish_line(end);
                    }
                    return LineStatus::Malformed;
                }
                _ => self.checked_idx += 1,
            }
        }
        LineStatus::Incomplete
    }

    fn finish_line(&mut self, end: usize) -> LineStatus {
        let range = self.start_line..end;
        self.start_line = self.checked_idx;
        LineStatus::Complete(range)
    }

    /// Borrows a line previously reported by [`scan_line`](Self::scan_line).
    pub fn line(&self, range: Range<usize>) -> &[u8] {
        &self.buf[range]
    }

    /// Bytes after the last consumed line that have not been scanned yet.
    pub fn unparsed(&self) -> &[u8] {
        &self.buf[self.checked_idx..self.read_idx]
    }

    /// Consumes `n` unparsed bytes as an opaque block.
    pub fn consume(&mut self, n: usize) {
        self.checked_idx = (self.checked_idx + n).min(self.read_idx);
        self.start_line = self.checked_idx;
    }

    /// Forgets all buffered data for the next transaction.
    pub fn clear(&mut self) {
        self.read_idx = 0;
        self.checked_idx = 0;
        self.start_line = 0;
    }
}
