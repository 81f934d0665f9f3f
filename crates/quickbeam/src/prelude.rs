//! Boot definitions
//!
//! The natives and generic verbs every engine starts with. Generic
//! handlers register per kind before the dispatch table seals; the
//! natives and the verb actions themselves are defined into lib during
//! boot, after the engine exists.

use std::sync::Arc;

use crate::action::{ActionFn, DispatchBuilder, Dispatcher};
use crate::array::ArrayBody;
use crate::cell::{Cell, Kind};
use crate::context::ContextHandle;
use crate::engine::Engine;
use crate::error::{CoreError, Result};
use crate::heap::SeriesHandle;
use crate::symbol::SymbolTable;

/// Hook the stock generic handlers into a dispatch builder. Runs before
/// the table seals, so embedders composing their own table can layer
/// more rows on top of (or instead of) these.
pub fn register_generics(symbols: &SymbolTable, builder: &mut DispatchBuilder) {
    let length_of = symbols.intern("length-of");
    let first = symbols.intern("first");
    let pick = symbols.intern("pick");
    let append = symbols.intern("append");
    let freeze = symbols.intern("freeze");
    let copy = symbols.intern("copy");

    const ARRAYS: [Kind; 4] = [Kind::Block, Kind::Group, Kind::Path, Kind::Tuple];

    let handler: ActionFn = Arc::new(length_of_array);
    for kind in ARRAYS {
        builder.register(length_of, kind, handler.clone());
    }
    builder.register(length_of, Kind::Text, Arc::new(length_of_text));
    builder.register(length_of, Kind::Binary, Arc::new(length_of_binary));
    builder.register(length_of, Kind::Object, Arc::new(length_of_context));
    builder.register(length_of, Kind::Frame, Arc::new(length_of_context));

    let handler: ActionFn = Arc::new(first_array);
    for kind in ARRAYS {
        builder.register(first, kind, handler.clone());
    }
    builder.register(first, Kind::Text, Arc::new(first_text));
    builder.register(first, Kind::Binary, Arc::new(first_binary));

    let handler: ActionFn = Arc::new(pick_any);
    for kind in ARRAYS {
        builder.register(pick, kind, handler.clone());
    }
    for kind in [Kind::Text, Kind::Binary, Kind::Object, Kind::Frame] {
        builder.register(pick, kind, handler.clone());
    }

    builder.register(append, Kind::Block, Arc::new(append_array));
    builder.register(append, Kind::Group, Arc::new(append_array));
    builder.register(append, Kind::Text, Arc::new(append_text));
    builder.register(append, Kind::Binary, Arc::new(append_binary));

    let handler: ActionFn = Arc::new(freeze_value);
    for kind in ARRAYS {
        builder.register(freeze, kind, handler.clone());
    }
    for kind in [Kind::Text, Kind::Binary, Kind::Object, Kind::Frame] {
        builder.register(freeze, kind, handler.clone());
    }

    let handler: ActionFn = Arc::new(copy_array);
    for kind in ARRAYS {
        builder.register(copy, kind, handler.clone());
    }
    builder.register(copy, Kind::Text, Arc::new(copy_bytes));
    builder.register(copy, Kind::Binary, Arc::new(copy_bytes));
    builder.register(copy, Kind::Object, Arc::new(copy_object));
}

/// Define the stock words into a freshly booted engine's lib.
pub(crate) fn install(engine: &mut Engine) -> Result<()> {
    engine.register_native("quote", "[value]", Arc::new(native_quote))?;
    engine.register_native("unquote", "[value]", Arc::new(native_unquote))?;
    engine.register_native("the", "['value]", Arc::new(native_the))?;
    engine.register_native("decay", "[value]", Arc::new(native_decay))?;
    engine.register_native("reify", "[value]", Arc::new(native_reify))?;
    engine.register_native("does", "[body [block!]]", Arc::new(native_does))?;

    engine.register_generic("length-of", "[series]", "length-of")?;
    engine.register_generic("first", "[series]", "first")?;
    engine.register_generic("pick", "[series index [integer! word! blank!]]", "pick")?;
    engine.register_generic("append", "[series value]", "append")?;
    engine.register_generic("freeze", "[value]", "freeze")?;
    engine.register_generic("copy", "[value]", "copy")?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Natives
// ═══════════════════════════════════════════════════════════════════════

fn native_quote(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    frame.get_var(&engine.heap, 0)?.quote()
}

fn native_unquote(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    frame.get_var(&engine.heap, 0)?.unquote()
}

// Literal parameter: hands back exactly the cell that followed the call.
fn native_the(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    frame.get_var_lifted(&engine.heap, 0)
}

fn native_decay(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    Ok(frame.get_var_lifted(&engine.heap, 0)?.decay())
}

// An isotope argument comes back as its quasiform, a normal value
// unchanged. The quasiform can sit in blocks and re-evaluate to the
// isotope later.
fn native_reify(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    let value = frame.get_var_lifted(&engine.heap, 0)?;
    if value.is_isotope() {
        Ok(value.quasi())
    } else {
        Ok(value)
    }
}

fn native_does(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    let body = frame.get_var(&engine.heap, 0)?;
    match body.series_ref() {
        Some((series, _)) => {
            let handle = engine
                .actions
                .push(None, Vec::new(), Dispatcher::Body(series), None);
            Ok(Cell::action(handle))
        }
        None => Err(CoreError::BadActionSpec {
            reason: "does needs a block body".to_string(),
        }),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Generic handlers
// ═══════════════════════════════════════════════════════════════════════

fn series_parts(verb: &str, target: Cell) -> Result<(SeriesHandle, u32)> {
    target.series_ref().ok_or_else(|| CoreError::NoHandlerForType {
        verb: verb.to_string(),
        kind: target.kind().name().to_string(),
    })
}

fn length_of_array(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    let target = frame.get_var(&engine.heap, 0)?;
    let (handle, index) = series_parts("length-of", target)?;
    let len = engine.heap.array(handle)?.len();
    Ok(Cell::integer(len.saturating_sub(index as usize) as i64))
}

fn length_of_text(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    let target = frame.get_var(&engine.heap, 0)?;
    let (handle, index) = series_parts("length-of", target)?;
    let text = engine.heap.text(handle)?;
    let tail = text.get(index as usize..).unwrap_or("");
    Ok(Cell::integer(tail.chars().count() as i64))
}

fn length_of_binary(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    let target = frame.get_var(&engine.heap, 0)?;
    let (handle, index) = series_parts("length-of", target)?;
    let len = engine.heap.bytes(handle)?.len();
    Ok(Cell::integer(len.saturating_sub(index as usize) as i64))
}

fn length_of_context(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    let target = frame.get_var(&engine.heap, 0)?;
    let context = target.context_ref().ok_or_else(|| CoreError::NoHandlerForType {
        verb: "length-of".to_string(),
        kind: target.kind().name().to_string(),
    })?;
    Ok(Cell::integer(context.len(&engine.heap)? as i64))
}

// `first` errors on empty series where `pick` would soften to blank.
fn first_array(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    let target = frame.get_var(&engine.heap, 0)?;
    let (handle, index) = series_parts("first", target)?;
    engine
        .heap
        .array(handle)?
        .at(index as usize)
        .ok_or(CoreError::OutOfRange {
            index: index as usize,
        })
}

fn first_text(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    let target = frame.get_var(&engine.heap, 0)?;
    let (handle, index) = series_parts("first", target)?;
    let text = engine.heap.text(handle)?;
    let tail = text.get(index as usize..).unwrap_or("");
    match tail.chars().next() {
        Some(ch) => {
            let mut buffer = [0u8; 4];
            Ok(Cell::rune(ch.encode_utf8(&mut buffer)).unwrap_or_else(Cell::blank))
        }
        None => Err(CoreError::OutOfRange {
            index: index as usize,
        }),
    }
}

fn first_binary(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    let target = frame.get_var(&engine.heap, 0)?;
    let (handle, index) = series_parts("first", target)?;
    match engine.heap.bytes(handle)?.get(index as usize) {
        Some(byte) => Ok(Cell::integer(*byte as i64)),
        None => Err(CoreError::OutOfRange {
            index: index as usize,
        }),
    }
}

fn pick_any(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    let target = frame.get_var(&engine.heap, 0)?;
    let picker = frame.get_var(&engine.heap, 1)?;
    engine.pick_value(target, picker)
}

// The value is read lifted: an isotope argument reaches `push` intact
// and trips the array storage guard instead of decaying on the way in.
fn append_array(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    let target = frame.get_var(&engine.heap, 0)?;
    let value = frame.get_var_lifted(&engine.heap, 1)?;
    let (handle, _) = series_parts("append", target)?;
    engine.heap.array_mut(handle)?.push(value)?;
    Ok(target)
}

fn append_text(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    let target = frame.get_var(&engine.heap, 0)?;
    let value = frame.get_var(&engine.heap, 1)?;
    let (handle, _) = series_parts("append", target)?;
    let addition = match value.kind() {
        Kind::Text | Kind::Rune => text_content(engine, value)?,
        other => {
            return Err(CoreError::ArgumentTypeMismatch {
                action: "append".to_string(),
                param: "value".to_string(),
                expected: "text! rune!".to_string(),
                got: other.name().to_string(),
            })
        }
    };
    if addition.contains('\0') {
        return Err(CoreError::ArgumentTypeMismatch {
            action: "append".to_string(),
            param: "value".to_string(),
            expected: "text without codepoint zero".to_string(),
            got: value.kind().name().to_string(),
        });
    }
    engine
        .heap
        .bytes_mut(handle)?
        .extend_from_slice(addition.as_bytes());
    Ok(target)
}

fn append_binary(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    let target = frame.get_var(&engine.heap, 0)?;
    let value = frame.get_var(&engine.heap, 1)?;
    let (handle, _) = series_parts("append", target)?;
    match (value.kind(), value.as_int()) {
        (Kind::Binary, _) => {
            let (other, from) = series_parts("append", value)?;
            let addition: Vec<u8> = engine
                .heap
                .bytes(other)?
                .get(from as usize..)
                .unwrap_or(&[])
                .to_vec();
            engine.heap.bytes_mut(handle)?.extend_from_slice(&addition);
        }
        (Kind::Integer, Some(byte)) if (0..=255).contains(&byte) => {
            engine.heap.bytes_mut(handle)?.push(byte as u8);
        }
        (other, _) => {
            return Err(CoreError::ArgumentTypeMismatch {
                action: "append".to_string(),
                param: "value".to_string(),
                expected: "binary! or integer! in 0..=255".to_string(),
                got: other.name().to_string(),
            })
        }
    }
    Ok(target)
}

fn freeze_value(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    let target = frame.get_var(&engine.heap, 0)?;
    if let Some(context) = target.context_ref() {
        context.freeze(&mut engine.heap)?;
    } else if let Some((handle, _)) = target.series_ref() {
        engine.heap.freeze(handle)?;
    }
    Ok(target)
}

// Shallow copy from the cell's position to the tail.
fn copy_array(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    let target = frame.get_var(&engine.heap, 0)?;
    let (handle, index) = series_parts("copy", target)?;
    let source = engine.heap.array(handle)?;
    let body = if index == 0 {
        source.copy_shallow()
    } else {
        let cells: Vec<Cell> = source
            .cells()
            .get(index as usize..)
            .unwrap_or(&[])
            .to_vec();
        ArrayBody::from_cells(cells)
    };
    let copy = engine.heap.alloc_array_body(body);
    Ok(Cell::series_at(target.kind(), copy, 0))
}

fn copy_bytes(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    let target = frame.get_var(&engine.heap, 0)?;
    let (handle, index) = series_parts("copy", target)?;
    let bytes: Vec<u8> = engine
        .heap
        .bytes(handle)?
        .get(index as usize..)
        .unwrap_or(&[])
        .to_vec();
    let copy = engine.heap.adopt_bytes(bytes);
    Ok(Cell::series_at(target.kind(), copy, 0))
}

fn copy_object(engine: &mut Engine, frame: ContextHandle) -> Result<Cell> {
    let target = frame.get_var(&engine.heap, 0)?;
    let context = target.context_ref().ok_or_else(|| CoreError::NoHandlerForType {
        verb: "copy".to_string(),
        kind: target.kind().name().to_string(),
    })?;
    let copy = context.copy(&mut engine.heap)?;
    Ok(Cell::object(copy))
}

fn text_content(engine: &Engine, cell: Cell) -> Result<String> {
    if let Some(text) = cell.rune_text() {
        return Ok(text.to_string());
    }
    if let Some((handle, index)) = cell.series_ref() {
        let text = engine.heap.text(handle)?;
        return Ok(text.get(index as usize..).unwrap_or("").to_string());
    }
    Ok(String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_of_dispatches_by_kind() {
        let mut engine = Engine::new();
        assert_eq!(engine.run("length-of [1 2 3]").unwrap().as_int(), Some(3));
        assert_eq!(engine.run("length-of \"héllo\"").unwrap().as_int(), Some(5));
        assert_eq!(engine.run("length-of #{DEADBEEF}").unwrap().as_int(), Some(4));
    }

    #[test]
    fn test_missing_handler_reports_verb_and_kind() {
        let mut engine = Engine::new();
        match engine.run("length-of 5") {
            Err(CoreError::NoHandlerForType { verb, kind }) => {
                assert_eq!(verb, "length-of");
                assert_eq!(kind, "integer!");
            }
            other => panic!("expected dispatch miss, got {:?}", other),
        }
    }

    #[test]
    fn test_first_errors_where_pick_softens() {
        let mut engine = Engine::new();
        assert_eq!(engine.run("first [7 8]").unwrap().as_int(), Some(7));
        assert!(matches!(
            engine.run("first []"),
            Err(CoreError::OutOfRange { .. })
        ));
        assert_eq!(engine.run("pick [7 8] 9").unwrap().kind(), Kind::Blank);
        assert_eq!(engine.run("pick [7 8] 2").unwrap().as_int(), Some(8));
    }

    #[test]
    fn test_append_grows_in_place() {
        let mut engine = Engine::new();
        engine.run("b: [1]").unwrap();
        assert_eq!(engine.run("length-of append b 2").unwrap().as_int(), Some(2));
        assert_eq!(engine.run("b/2").unwrap().as_int(), Some(2));

        engine.run("t: \"ab\"").unwrap();
        engine.run("append t \"cd\"").unwrap();
        assert_eq!(engine.run("length-of t").unwrap().as_int(), Some(4));

        engine.run("bin: #{00}").unwrap();
        engine.run("append bin 255").unwrap();
        assert_eq!(engine.run("length-of bin").unwrap().as_int(), Some(2));
    }

    #[test]
    fn test_freeze_stops_append() {
        let mut engine = Engine::new();
        engine.run("b: [1] freeze b").unwrap();
        assert!(matches!(
            engine.run("append b 2"),
            Err(CoreError::ProtectedSeries { .. })
        ));
    }

    #[test]
    fn test_copy_detaches_storage() {
        let mut engine = Engine::new();
        engine.run("a: [1 2] c: copy a append c 3").unwrap();
        assert_eq!(engine.run("length-of a").unwrap().as_int(), Some(2));
        assert_eq!(engine.run("length-of c").unwrap().as_int(), Some(3));
    }

    #[test]
    fn test_quote_family() {
        let mut engine = Engine::new();
        assert_eq!(engine.run("quote 1").unwrap().quotes(), 1);
        assert_eq!(engine.run("unquote quote 1").unwrap().quotes(), 0);
        assert!(matches!(
            engine.run("unquote 1"),
            Err(CoreError::QuoteUnderflow)
        ));

        let word = engine.run("the foo").unwrap();
        assert_eq!(word.kind(), Kind::Word);
        assert_eq!(word.quotes(), 0);
    }

    #[test]
    fn test_decay_and_reify() {
        let mut engine = Engine::new();
        let decayed = engine.run("decay ~foo~").unwrap();
        assert!(!decayed.is_isotope());
        assert_eq!(decayed.kind(), Kind::Word);

        let reified = engine.run("reify ~foo~").unwrap();
        assert!(reified.is_quasi());
        assert!(!reified.is_isotope());

        let plain = engine.run("reify 42").unwrap();
        assert_eq!(plain.as_int(), Some(42));
        assert!(!plain.is_quasi());
    }
}
