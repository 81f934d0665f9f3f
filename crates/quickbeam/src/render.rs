//! Canonical value rendering
//!
//! Renders cells back into scannable source, one space between values,
//! ignoring the stored newline layout. Scanning the rendition of a value
//! made of source kinds yields the same token sequence and nesting.
//! Contexts, frames, and actions have no literal form; they render as
//! `#[...]` placeholders that are not meant to scan back.

use crate::cell::{Cell, Kind, Lift};
use crate::context::ContextHandle;
use crate::error::Result;
use crate::heap::{Heap, SeriesHandle};
use crate::symbol::SymbolTable;

/// Render one value.
pub fn render_value(heap: &Heap, symbols: &SymbolTable, cell: Cell) -> Result<String> {
    let mut out = String::new();
    let mut visiting = Vec::new();
    Renderer { heap, symbols }.value(&mut out, &mut visiting, cell)?;
    Ok(out)
}

/// Render the contents of an array without enclosing brackets, the shape
/// scanned sources come in.
pub fn render_array(heap: &Heap, symbols: &SymbolTable, handle: SeriesHandle) -> Result<String> {
    let mut out = String::new();
    let mut visiting = vec![handle];
    let renderer = Renderer { heap, symbols };
    renderer.items(&mut out, &mut visiting, handle, " ")?;
    Ok(out)
}

struct Renderer<'a> {
    heap: &'a Heap,
    symbols: &'a SymbolTable,
}

impl Renderer<'_> {
    fn value(&self, out: &mut String, visiting: &mut Vec<SeriesHandle>, cell: Cell) -> Result<()> {
        for _ in 0..cell.quotes() {
            out.push('\'');
        }
        // Isotopes have no source form; they render like their quasiform.
        let lifted = cell.lift() != Lift::Plain;
        if lifted {
            out.push('~');
            if cell.kind() == Kind::Blank {
                return Ok(());
            }
        }
        self.plain(out, visiting, cell)?;
        if lifted {
            out.push('~');
        }
        Ok(())
    }

    fn plain(&self, out: &mut String, visiting: &mut Vec<SeriesHandle>, cell: Cell) -> Result<()> {
        match cell.kind() {
            Kind::Blank => out.push('_'),
            Kind::Integer => {
                if let Some(value) = cell.as_int() {
                    out.push_str(&value.to_string());
                }
            }
            Kind::Rune => self.rune(out, cell)?,
            Kind::Word => self.word(out, cell),
            Kind::SetWord => {
                self.word(out, cell);
                out.push(':');
            }
            Kind::GetWord => {
                out.push(':');
                self.word(out, cell);
            }
            Kind::Text => {
                if let Some((series, _)) = cell.series_ref() {
                    text_literal(out, self.heap.text(series)?);
                }
            }
            Kind::Binary => {
                if let Some((series, _)) = cell.series_ref() {
                    out.push_str("#{");
                    for byte in self.heap.bytes(series)? {
                        out.push_str(&format!("{:02X}", byte));
                    }
                    out.push('}');
                }
            }
            Kind::Block => self.delimited(out, visiting, cell, "[", "]", " ")?,
            Kind::Group => self.delimited(out, visiting, cell, "(", ")", " ")?,
            Kind::Path => self.delimited(out, visiting, cell, "", "", "/")?,
            Kind::Tuple => self.delimited(out, visiting, cell, "", "", ".")?,
            Kind::Object => out.push_str("#[object!]"),
            Kind::Frame => out.push_str("#[frame!]"),
            Kind::Action => out.push_str("#[action!]"),
        }
        Ok(())
    }

    fn word(&self, out: &mut String, cell: Cell) {
        if let Some(symbol) = cell.as_word() {
            out.push_str(&self.symbols.spelling(symbol));
        }
    }

    fn rune(&self, out: &mut String, cell: Cell) -> Result<()> {
        let owned;
        let content = match cell.rune_text() {
            Some(text) => text,
            None => {
                // Long runes live in the heap as UTF-8 bytes.
                let (series, _) = match cell.series_ref() {
                    Some(found) => found,
                    None => return Ok(()),
                };
                owned = self.heap.text(series)?.to_string();
                &owned
            }
        };
        out.push('#');
        if content == "\u{0}" {
            return Ok(());
        }
        let word_safe = !content.is_empty()
            && content.bytes().all(|b| {
                b.is_ascii_alphanumeric()
                    || matches!(b, b'+' | b'-' | b'*' | b'!' | b'&' | b'?' | b'=' | b'_' | b'<' | b'>' | b'|')
            });
        if word_safe {
            out.push_str(content);
        } else if content.chars().count() == 1 {
            out.push('"');
            for c in content.chars() {
                match c {
                    '\n' => out.push_str("^/"),
                    '\t' => out.push_str("^-"),
                    '"' => out.push_str("^\""),
                    '^' => out.push_str("^^"),
                    c => out.push(c),
                }
            }
            out.push('"');
        } else {
            out.push_str(content);
        }
        Ok(())
    }

    fn delimited(
        &self,
        out: &mut String,
        visiting: &mut Vec<SeriesHandle>,
        cell: Cell,
        open: &str,
        close: &str,
        separator: &str,
    ) -> Result<()> {
        let (series, _) = match cell.series_ref() {
            Some(found) => found,
            None => return Ok(()),
        };
        out.push_str(open);
        if visiting.contains(&series) {
            out.push_str("...");
        } else {
            visiting.push(series);
            self.items(out, visiting, series, separator)?;
            visiting.pop();
        }
        out.push_str(close);
        Ok(())
    }

    fn items(
        &self,
        out: &mut String,
        visiting: &mut Vec<SeriesHandle>,
        handle: SeriesHandle,
        separator: &str,
    ) -> Result<()> {
        for (index, cell) in self.heap.array(handle)?.cells().iter().enumerate() {
            if index > 0 {
                out.push_str(separator);
            }
            self.value(out, visiting, *cell)?;
        }
        Ok(())
    }
}

/// Render a context for hosts that want to see inside objects: each key
/// as a set-word followed by its rendered value.
pub fn render_context(
    heap: &Heap,
    symbols: &SymbolTable,
    context: ContextHandle,
) -> Result<String> {
    let keys = context.keys(heap)?;
    let mut out = String::new();
    for (index, key) in keys.keys().enumerate() {
        if index > 0 {
            out.push(' ');
        }
        out.push_str(&symbols.spelling(key));
        out.push_str(": ");
        let value = context.get_var(heap, index as u32)?;
        out.push_str(&render_value(heap, symbols, value)?);
    }
    Ok(out)
}

fn text_literal(out: &mut String, content: &str) {
    out.push('"');
    for c in content.chars() {
        match c {
            '\n' => out.push_str("^/"),
            '\t' => out.push_str("^-"),
            '"' => out.push_str("^\""),
            '^' => out.push_str("^^"),
            c => out.push(c),
        }
    }
    out.push('"');
}
