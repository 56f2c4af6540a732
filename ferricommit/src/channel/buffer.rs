//! Receive buffer with tail-only prompt search.
//!
//! Prompts are only searched for in the last `search_depth` bytes of the
//! buffer, so a long `admin display-config` dump does not make every read
//! rescan megabytes of output.

use bytes::BytesMut;
use regex::bytes::Regex;
use vte::{Parser, Perform};

/// Buffer for accumulating device output and finding the trailing prompt.
pub struct PatternBuffer {
    /// Accumulated output, ANSI sequences already removed.
    buffer: BytesMut,

    /// How many bytes from the end to search for prompts.
    search_depth: usize,

    /// Escape-sequence parser; keeps state across chunk boundaries.
    parser: Parser,
}

impl PatternBuffer {
    /// Create a new pattern buffer with the specified search depth.
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            search_depth,
            parser: Parser::new(),
        }
    }

    /// Append a chunk of device output, dropping ANSI escape sequences.
    pub fn extend(&mut self, data: &[u8]) {
        let mut printer = Printable {
            out: &mut self.buffer,
        };
        self.parser.advance(&mut printer, data);
    }

    /// Find `pattern` in the tail of the buffer.
    ///
    /// Returns `(start, end)` offsets into the whole buffer.
    pub fn find_tail(&self, pattern: &Regex) -> Option<(usize, usize)> {
        let offset = self.buffer.len().saturating_sub(self.search_depth);
        pattern
            .find(&self.buffer[offset..])
            .map(|m| (offset + m.start(), offset + m.end()))
    }

    /// Remove and return everything up to `end`.
    pub fn split_to(&mut self, end: usize) -> Vec<u8> {
        self.buffer.split_to(end).to_vec()
    }

    /// Get a reference to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// `vte` performer that keeps printable text, newlines and tabs.
struct Printable<'a> {
    out: &'a mut BytesMut,
}

impl Perform for Printable<'_> {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.out.extend_from_slice(&[byte]);
        }
    }
}
