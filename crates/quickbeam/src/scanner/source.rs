//! Byte-level view of scanner input with position tracking.

use std::sync::Arc;

use crate::error::{ScanError, ScanErrorKind};

/// Input bytes plus the cursor state needed for error reporting: byte
/// offset, line number, and the offset where the current line starts.
pub(crate) struct Source<'a> {
    bytes: &'a [u8],
    offset: usize,
    line: u32,
    line_start: usize,
    file: Option<Arc<str>>,
}

impl<'a> Source<'a> {
    pub(crate) fn new(bytes: &'a [u8], file: Option<&str>) -> Self {
        Source {
            bytes,
            offset: 0,
            line: 1,
            line_start: 0,
            file: file.map(Arc::from),
        }
    }

    /// The byte under the cursor, if any.
    pub(crate) fn peek(&self) -> Option<u8> {
        self.bytes.get(self.offset).copied()
    }

    /// The byte `ahead` positions past the cursor.
    pub(crate) fn lookahead(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.offset + ahead).copied()
    }

    /// Advance one byte, tracking line starts.
    pub(crate) fn consume(&mut self) {
        if let Some(byte) = self.peek() {
            self.offset += 1;
            if byte == b'\n' {
                self.line += 1;
                self.line_start = self.offset;
            }
        }
    }

    /// Consume and return the byte under the cursor.
    pub(crate) fn take(&mut self) -> Option<u8> {
        let byte = self.peek();
        self.consume();
        byte
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn slice(&self, start: usize, end: usize) -> &'a [u8] {
        &self.bytes[start..end]
    }

    pub(crate) fn line(&self) -> u32 {
        self.line
    }

    /// One-based byte column on the current line.
    pub(crate) fn column(&self) -> u32 {
        (self.offset - self.line_start) as u32 + 1
    }

    pub(crate) fn file(&self) -> Option<Arc<str>> {
        self.file.clone()
    }

    /// An error at the cursor.
    pub(crate) fn error(&self, kind: ScanErrorKind) -> ScanError {
        self.error_at(kind, self.line, self.column())
    }

    /// An error at a remembered position, e.g. an unclosed opener.
    pub(crate) fn error_at(&self, kind: ScanErrorKind, line: u32, column: u32) -> ScanError {
        ScanError {
            kind,
            file: self.file.as_deref().map(String::from),
            line,
            column,
        }
    }
}
