//! Source scanner
//!
//! Turns UTF-8 bytes into loaded arrays of cells. All state lives in an
//! explicit [`Scanner`] value: the byte cursor with its line accounting,
//! and a stack of open levels, one per unclosed `[` or `(` plus the top
//! level itself. Paths and tuples are assembled from adjacent lexemes as
//! they are scanned, so `a/b.c` needs no lookahead beyond one byte.
//!
//! Errors distinguish running out of input while something is open
//! (`MissingDelimiter`, the "feed me another line" signal interactive
//! hosts test with [`ScanError::is_incomplete`]) from a closer that does
//! not match the innermost open construct (`MismatchedDelimiter`) and
//! from malformed lexemes (`Invalid`). Every error carries the file
//! label, line, and column.

mod source;

use crate::array::ArrayBody;
use crate::cell::{Cell, Kind};
use crate::error::{ScanError, ScanErrorKind};
use crate::heap::{Heap, SeriesHandle};
use crate::symbol::SymbolTable;

use source::Source;

/// Scan a whole source into a managed array.
///
/// The returned handle designates a block-flavored array carrying the
/// file label and line-layout metadata of the source.
pub fn scan(
    heap: &mut Heap,
    symbols: &SymbolTable,
    bytes: &[u8],
    file: Option<&str>,
) -> Result<SeriesHandle, ScanError> {
    Scanner::new(heap, symbols, bytes, file).run()
}

/// What closes the innermost open construct.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Closer {
    Top,
    Bracket,
    Paren,
}

impl Closer {
    fn expected(self) -> Option<char> {
        match self {
            Closer::Top => None,
            Closer::Bracket => Some(']'),
            Closer::Paren => Some(')'),
        }
    }
}

/// One open nesting level: the cells gathered so far, their layout bits,
/// where the level began, and the decoration its opener claimed (quote
/// prefix, quasi marker, preceding newline) to be applied when it closes.
struct Level {
    closer: Closer,
    cells: Vec<Cell>,
    newlines: Vec<bool>,
    open_line: u32,
    open_column: u32,
    pending_newline: bool,
    quotes_on_close: u8,
    quasi_on_close: bool,
    newline_on_close: bool,
}

impl Level {
    fn top() -> Self {
        Level::open(Closer::Top, 1, 1, 0, false, false)
    }

    fn open(
        closer: Closer,
        line: u32,
        column: u32,
        quotes: u8,
        quasi: bool,
        newline: bool,
    ) -> Self {
        Level {
            closer,
            cells: Vec::new(),
            newlines: Vec::new(),
            open_line: line,
            open_column: column,
            pending_newline: false,
            quotes_on_close: quotes,
            quasi_on_close: quasi,
            newline_on_close: newline,
        }
    }
}

struct Scanner<'a> {
    src: Source<'a>,
    symbols: &'a SymbolTable,
    heap: &'a mut Heap,
    levels: Vec<Level>,
}

fn is_word_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || matches!(byte, b'+' | b'-' | b'*' | b'!' | b'&' | b'?' | b'=' | b'_' | b'<' | b'>' | b'|')
}

fn is_word_char(byte: u8) -> bool {
    is_word_start(byte) || byte.is_ascii_digit()
}

/// Bytes that end a value: whitespace, closers, a comment, or nothing.
fn ends_value(byte: Option<u8>) -> bool {
    match byte {
        None => true,
        Some(b) => matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b']' | b')' | b';'),
    }
}

impl<'a> Scanner<'a> {
    fn new(heap: &'a mut Heap, symbols: &'a SymbolTable, bytes: &'a [u8], file: Option<&str>) -> Self {
        Scanner {
            src: Source::new(bytes, file),
            symbols,
            heap,
            levels: vec![Level::top()],
        }
    }

    fn run(mut self) -> Result<SeriesHandle, ScanError> {
        loop {
            self.skip_filler();
            let Some(byte) = self.src.peek() else {
                if let Some(level) = self.levels.last() {
                    if level.closer != Closer::Top {
                        let expected = level.closer.expected().unwrap_or(']');
                        return Err(self.src.error_at(
                            ScanErrorKind::MissingDelimiter { expected },
                            level.open_line,
                            level.open_column,
                        ));
                    }
                }
                return Ok(self.finish_top());
            };
            match byte {
                b']' | b')' => self.close_level(byte as char)?,
                _ => self.scan_element()?,
            }
        }
    }

    fn top_mut(&mut self) -> &mut Level {
        // The stack always holds at least the top level.
        let last = self.levels.len() - 1;
        &mut self.levels[last]
    }

    /// Skip whitespace and `;` comments, recording newlines for the
    /// layout metadata of the next value.
    fn skip_filler(&mut self) {
        loop {
            match self.src.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') => self.src.consume(),
                Some(b'\n') => {
                    self.src.consume();
                    self.top_mut().pending_newline = true;
                }
                Some(b';') => {
                    while !matches!(self.src.peek(), None | Some(b'\n')) {
                        self.src.consume();
                    }
                }
                _ => break,
            }
        }
    }

    fn emit(&mut self, cell: Cell, newline: bool) {
        let level = self.top_mut();
        level.cells.push(cell);
        level.newlines.push(newline);
    }

    /// Build the array for a finished level and hand it to the heap.
    fn seal(&mut self, cells: Vec<Cell>, newlines: Vec<bool>, line: u32) -> SeriesHandle {
        let mut body = ArrayBody::from_cells(cells);
        for (index, flag) in newlines.iter().enumerate() {
            body.set_newline_before(index, *flag);
        }
        body.set_origin(self.src.file(), line);
        self.heap.alloc_array_body(body)
    }

    fn finish_top(&mut self) -> SeriesHandle {
        let level = self.levels.swap_remove(0);
        self.seal(level.cells, level.newlines, level.open_line)
    }

    /// One value: quote prefix, optional quasi marker, the value itself
    /// (possibly extended into a path or tuple by adjacency), and the
    /// decoration wrap-up.
    fn scan_element(&mut self) -> Result<(), ScanError> {
        let newline = {
            let level = self.top_mut();
            std::mem::take(&mut level.pending_newline)
        };

        let mut quotes: u8 = 0;
        while self.src.peek() == Some(b'\'') {
            self.src.consume();
            quotes = quotes.checked_add(1).ok_or_else(|| {
                self.src.error(ScanErrorKind::Invalid {
                    what: "quote level too deep".to_string(),
                })
            })?;
        }

        let mut quasi = false;
        if self.src.peek() == Some(b'~') {
            self.src.consume();
            if ends_value(self.src.peek()) {
                // Lone tilde: the quasi blank.
                let cell = self.decorate(Cell::blank().quasi(), quotes, false)?;
                self.emit(cell, newline);
                return Ok(());
            }
            if self.src.peek() == Some(b'~') {
                return Err(self.src.error(ScanErrorKind::Invalid {
                    what: "empty quasiform".to_string(),
                }));
            }
            quasi = true;
        }

        match self.src.peek() {
            Some(b'[') => return self.open_level(Closer::Bracket, quotes, quasi, newline),
            Some(b'(') => return self.open_level(Closer::Paren, quotes, quasi, newline),
            byte if ends_value(byte) => {
                return Err(self.src.error(ScanErrorKind::Invalid {
                    what: "quote prefix needs an adjacent value".to_string(),
                }))
            }
            _ => {}
        }

        let cell = self.scan_simple()?;
        let cell = self.extend_sequence(cell)?;
        let cell = self.decorate(cell, quotes, quasi)?;
        self.emit(cell, newline);
        Ok(())
    }

    /// Apply a pending quote prefix and close a pending quasiform.
    fn decorate(&mut self, cell: Cell, quotes: u8, quasi: bool) -> Result<Cell, ScanError> {
        let mut cell = cell;
        if quasi {
            match self.src.peek() {
                Some(b'~') => {
                    self.src.consume();
                    cell = cell.quasi();
                }
                None => {
                    return Err(self.src.error(ScanErrorKind::MissingDelimiter {
                        expected: '~',
                    }))
                }
                Some(_) => {
                    return Err(self.src.error(ScanErrorKind::Invalid {
                        what: "quasiform not closed with '~'".to_string(),
                    }))
                }
            }
        }
        if quotes > 0 {
            cell = cell.quote_depth(quotes).map_err(|_| {
                self.src.error(ScanErrorKind::Invalid {
                    what: "quote level too deep".to_string(),
                })
            })?;
        }
        Ok(cell)
    }

    fn open_level(
        &mut self,
        closer: Closer,
        quotes: u8,
        quasi: bool,
        newline: bool,
    ) -> Result<(), ScanError> {
        let line = self.src.line();
        let column = self.src.column();
        self.src.consume();
        self.levels
            .push(Level::open(closer, line, column, quotes, quasi, newline));
        Ok(())
    }

    fn close_level(&mut self, found: char) -> Result<(), ScanError> {
        // Errors abort the whole scan, so popping before validating is
        // safe; nothing gets restored on failure.
        let Some(level) = self.levels.pop() else {
            return Err(self.src.error(ScanErrorKind::MismatchedDelimiter {
                expected: None,
                found,
            }));
        };
        if level.closer.expected() != Some(found) {
            return Err(self.src.error(ScanErrorKind::MismatchedDelimiter {
                expected: level.closer.expected(),
                found,
            }));
        }
        self.src.consume();

        let handle = self.seal(level.cells, level.newlines, level.open_line);
        let cell = match level.closer {
            Closer::Paren => Cell::group(handle),
            _ => Cell::block(handle),
        };
        let cell = self.decorate(cell, level.quotes_on_close, level.quasi_on_close)?;
        self.emit(cell, level.newline_on_close);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Simple values
    // ═══════════════════════════════════════════════════════════════════

    fn scan_simple(&mut self) -> Result<Cell, ScanError> {
        match self.src.peek() {
            Some(b) if b.is_ascii_digit() => self.scan_integer(),
            Some(b'+') | Some(b'-')
                if self.src.lookahead(1).is_some_and(|b| b.is_ascii_digit()) =>
            {
                self.scan_integer()
            }
            Some(b'"') => self.scan_text(),
            Some(b'#') => self.scan_rune(),
            Some(b':') => self.scan_get_word(),
            Some(b'/') | Some(b'.') => Err(self.src.error(ScanErrorKind::Invalid {
                what: "misplaced path separator".to_string(),
            })),
            Some(b) if is_word_start(b) => self.scan_word_like(),
            Some(b) if b.is_ascii() => Err(self.src.error(ScanErrorKind::Invalid {
                what: format!("unexpected character '{}'", b as char),
            })),
            Some(_) => Err(self.src.error(ScanErrorKind::Invalid {
                what: "words are limited to ascii".to_string(),
            })),
            None => Err(self.src.error(ScanErrorKind::Invalid {
                what: "expected a value".to_string(),
            })),
        }
    }

    fn scan_integer(&mut self) -> Result<Cell, ScanError> {
        let negative = match self.src.peek() {
            Some(b'-') => {
                self.src.consume();
                true
            }
            Some(b'+') => {
                self.src.consume();
                false
            }
            _ => false,
        };
        // Accumulate as a negative magnitude so i64::MIN scans cleanly.
        let mut value: i64 = 0;
        let mut digits = 0usize;
        while let Some(b) = self.src.peek() {
            if !b.is_ascii_digit() {
                break;
            }
            self.src.consume();
            digits += 1;
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_sub(i64::from(b - b'0')))
                .ok_or_else(|| {
                    self.src.error(ScanErrorKind::Invalid {
                        what: "integer out of range".to_string(),
                    })
                })?;
        }
        if digits == 0 {
            return Err(self.src.error(ScanErrorKind::Invalid {
                what: "sign without digits".to_string(),
            }));
        }
        if let Some(b) = self.src.peek() {
            if is_word_start(b) {
                return Err(self.src.error(ScanErrorKind::Invalid {
                    what: "malformed number".to_string(),
                }));
            }
        }
        if !negative {
            value = value.checked_neg().ok_or_else(|| {
                self.src.error(ScanErrorKind::Invalid {
                    what: "integer out of range".to_string(),
                })
            })?;
        }
        Ok(Cell::integer(value))
    }

    fn scan_word_run(&mut self) -> Result<&'a str, ScanError> {
        let start = self.src.offset();
        while self.src.peek().is_some_and(is_word_char) {
            self.src.consume();
        }
        std::str::from_utf8(self.src.slice(start, self.src.offset())).map_err(|_| {
            self.src.error(ScanErrorKind::Invalid {
                what: "words are limited to ascii".to_string(),
            })
        })
    }

    fn scan_word_like(&mut self) -> Result<Cell, ScanError> {
        let spelling = self.scan_word_run()?;
        // A lone underscore is the blank literal, not a word.
        if spelling == "_" && self.src.peek() != Some(b':') {
            return Ok(Cell::blank());
        }
        let symbol = self.symbols.intern(spelling);
        if self.src.peek() == Some(b':') {
            self.src.consume();
            Ok(Cell::set_word(symbol))
        } else {
            Ok(Cell::word(symbol))
        }
    }

    fn scan_get_word(&mut self) -> Result<Cell, ScanError> {
        self.src.consume();
        if !self.src.peek().is_some_and(is_word_start) {
            return Err(self.src.error(ScanErrorKind::Invalid {
                what: "':' needs a word".to_string(),
            }));
        }
        let spelling = self.scan_word_run()?;
        Ok(Cell::get_word(self.symbols.intern(spelling)))
    }

    fn scan_text(&mut self) -> Result<Cell, ScanError> {
        let open_line = self.src.line();
        let open_column = self.src.column();
        self.src.consume();
        let mut content: Vec<u8> = Vec::new();
        loop {
            match self.src.take() {
                None => {
                    return Err(self.src.error_at(
                        ScanErrorKind::MissingDelimiter { expected: '"' },
                        open_line,
                        open_column,
                    ))
                }
                Some(b'"') => break,
                Some(b'\n') => {
                    return Err(self.src.error(ScanErrorKind::Invalid {
                        what: "text string not closed before end of line".to_string(),
                    }))
                }
                Some(b'^') => content.push(self.scan_escape(open_line, open_column)?),
                Some(b) => content.push(b),
            }
        }
        let text = String::from_utf8(content).map_err(|_| {
            self.src.error(ScanErrorKind::Invalid {
                what: "text is not valid utf-8".to_string(),
            })
        })?;
        let handle = self.heap.alloc_text(&text);
        Ok(Cell::text(handle))
    }

    /// One caret escape, shared by text strings and character runes.
    /// `^@` (codepoint zero) is rejected here; character runes special-
    /// case it before calling.
    fn scan_escape(&mut self, open_line: u32, open_column: u32) -> Result<u8, ScanError> {
        match self.src.take() {
            None => Err(self.src.error_at(
                ScanErrorKind::MissingDelimiter { expected: '"' },
                open_line,
                open_column,
            )),
            Some(b'/') => Ok(b'\n'),
            Some(b'-') => Ok(b'\t'),
            Some(b'"') => Ok(b'"'),
            Some(b'^') => Ok(b'^'),
            Some(b'@') => Err(self.src.error(ScanErrorKind::Invalid {
                what: "text cannot hold codepoint zero, use a binary".to_string(),
            })),
            Some(b) => Err(self.src.error(ScanErrorKind::Invalid {
                what: format!("unknown escape ^{}", b as char),
            })),
        }
    }

    fn scan_rune(&mut self) -> Result<Cell, ScanError> {
        self.src.consume();
        match self.src.peek() {
            Some(b'{') => self.scan_binary(),
            Some(b'"') => self.scan_char_rune(),
            Some(b) if is_word_char(b) => {
                let spelling = self.scan_word_run()?;
                Ok(self.heap.alloc_rune(spelling))
            }
            // A bare `#` is the blackhole rune.
            _ => Ok(Cell::blackhole()),
        }
    }

    fn scan_char_rune(&mut self) -> Result<Cell, ScanError> {
        let open_line = self.src.line();
        let open_column = self.src.column();
        self.src.consume();
        let missing = |s: &Source<'_>| {
            s.error_at(
                ScanErrorKind::MissingDelimiter { expected: '"' },
                open_line,
                open_column,
            )
        };
        let mut buf = [0u8; 4];
        let content: &[u8] = match self.src.take() {
            None => return Err(missing(&self.src)),
            Some(b'^') => match self.src.take() {
                None => return Err(missing(&self.src)),
                Some(b'@') => {
                    buf[0] = 0;
                    &buf[..1]
                }
                Some(b'/') => {
                    buf[0] = b'\n';
                    &buf[..1]
                }
                Some(b'-') => {
                    buf[0] = b'\t';
                    &buf[..1]
                }
                Some(b'"') => {
                    buf[0] = b'"';
                    &buf[..1]
                }
                Some(b'^') => {
                    buf[0] = b'^';
                    &buf[..1]
                }
                Some(b) => {
                    return Err(self.src.error(ScanErrorKind::Invalid {
                        what: format!("unknown escape ^{}", b as char),
                    }))
                }
            },
            Some(lead) => {
                let extra = match lead {
                    b if b < 0x80 => 0,
                    b if b & 0xE0 == 0xC0 => 1,
                    b if b & 0xF0 == 0xE0 => 2,
                    b if b & 0xF8 == 0xF0 => 3,
                    _ => {
                        return Err(self.src.error(ScanErrorKind::Invalid {
                            what: "invalid utf-8 in rune".to_string(),
                        }))
                    }
                };
                buf[0] = lead;
                for slot in buf.iter_mut().take(extra + 1).skip(1) {
                    *slot = self.src.take().ok_or_else(|| missing(&self.src))?;
                }
                &buf[..extra + 1]
            }
        };
        let text = std::str::from_utf8(content)
            .map_err(|_| {
                self.src.error(ScanErrorKind::Invalid {
                    what: "invalid utf-8 in rune".to_string(),
                })
            })?
            .to_string();
        match self.src.take() {
            Some(b'"') => Ok(self.heap.alloc_rune(&text)),
            None => Err(missing(&self.src)),
            Some(_) => Err(self.src.error(ScanErrorKind::Invalid {
                what: "rune literal holds a single character".to_string(),
            })),
        }
    }

    fn scan_binary(&mut self) -> Result<Cell, ScanError> {
        let open_line = self.src.line();
        let open_column = self.src.column();
        self.src.consume();
        let mut bytes: Vec<u8> = Vec::new();
        let mut high: Option<u8> = None;
        loop {
            match self.src.take() {
                None => {
                    return Err(self.src.error_at(
                        ScanErrorKind::MissingDelimiter { expected: '}' },
                        open_line,
                        open_column,
                    ))
                }
                Some(b'}') => {
                    if high.is_some() {
                        return Err(self.src.error(ScanErrorKind::Invalid {
                            what: "odd number of hex digits in binary".to_string(),
                        }));
                    }
                    break;
                }
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {}
                Some(b) => {
                    let nibble = match b {
                        b'0'..=b'9' => b - b'0',
                        b'a'..=b'f' => b - b'a' + 10,
                        b'A'..=b'F' => b - b'A' + 10,
                        _ => {
                            return Err(self.src.error(ScanErrorKind::Invalid {
                                what: "expected hexadecimal digit in binary".to_string(),
                            }))
                        }
                    };
                    match high.take() {
                        None => high = Some(nibble),
                        Some(h) => bytes.push((h << 4) | nibble),
                    }
                }
            }
        }
        let handle = self.heap.adopt_bytes(bytes);
        Ok(Cell::binary(handle))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Paths and tuples
    // ═══════════════════════════════════════════════════════════════════

    /// Extend a word or integer into a path or tuple when the very next
    /// byte is a separator. Dots bind tighter than slashes, so `a.b/c`
    /// is a two-element path whose head is the tuple `a.b`.
    fn extend_sequence(&mut self, head: Cell) -> Result<Cell, ScanError> {
        if !matches!(head.kind(), Kind::Word | Kind::Integer)
            || !matches!(self.src.peek(), Some(b'/') | Some(b'.'))
        {
            return Ok(head);
        }
        let line = self.src.line();
        let mut path_segments: Vec<Cell> = Vec::new();
        let mut tuple_run: Vec<Cell> = vec![head];
        loop {
            match self.src.peek() {
                Some(b'.') => {
                    self.src.consume();
                    tuple_run.push(self.scan_atom()?);
                }
                Some(b'/') => {
                    self.src.consume();
                    let segment = self.seal_run(tuple_run, line);
                    path_segments.push(segment);
                    tuple_run = vec![self.scan_atom()?];
                }
                Some(b':') => {
                    return Err(self.src.error(ScanErrorKind::Invalid {
                        what: "set-word form not allowed after a sequence".to_string(),
                    }))
                }
                _ => break,
            }
        }
        let last = self.seal_run(tuple_run, line);
        if path_segments.is_empty() {
            return Ok(last);
        }
        path_segments.push(last);
        let mut body = ArrayBody::from_cells(path_segments);
        body.set_origin(self.src.file(), line);
        Ok(Cell::path(self.heap.alloc_array_body(body)))
    }

    /// One dot-run becomes a tuple; a run of one stays a plain value.
    fn seal_run(&mut self, run: Vec<Cell>, line: u32) -> Cell {
        if run.len() == 1 {
            run[0]
        } else {
            let mut body = ArrayBody::from_cells(run);
            body.set_origin(self.src.file(), line);
            Cell::tuple(self.heap.alloc_array_body(body))
        }
    }

    /// A sequence segment: a plain word or an integer, nothing else.
    fn scan_atom(&mut self) -> Result<Cell, ScanError> {
        match self.src.peek() {
            Some(b) if b.is_ascii_digit() => self.scan_integer(),
            Some(b'+') | Some(b'-')
                if self.src.lookahead(1).is_some_and(|b| b.is_ascii_digit()) =>
            {
                self.scan_integer()
            }
            Some(b) if is_word_start(b) => {
                let spelling = self.scan_word_run()?;
                if spelling == "_" {
                    return Ok(Cell::blank());
                }
                Ok(Cell::word(self.symbols.intern(spelling)))
            }
            _ => Err(self.src.error(ScanErrorKind::Invalid {
                what: "sequence needs a word or integer after the separator".to_string(),
            })),
        }
    }
}
