//! Contexts: append-only keyed variable stores
//!
//! A context is a varlist (heap array whose slot 0 is the archetype) paired
//! with a keylist of interned names. Keylists are `Arc`-shared: two
//! contexts made from one another share a single keylist until either
//! appends, at which point the appender forks a private copy. Indices
//! handed out before the fork stay valid for both parties forever.

use std::sync::Arc;

use indexmap::IndexSet;

use crate::action::ActionHandle;
use crate::cell::{Binding, Cell, Kind};
use crate::error::{CoreError, Result};
use crate::heap::{Heap, SeriesHandle};
use crate::symbol::Symbol;

/// Lookup case mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Case {
    /// Spelling must match byte-for-byte
    Sensitive,
    /// Case-folded match; an exact-spelling hit still takes precedence
    Insensitive,
}

/// What a context is for. Stored on the keylist, so shared keylists agree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextFlavor {
    /// Ordinary object
    Object,
    /// Module-level namespace
    Module,
    /// Action activation record
    Frame,
}

/// Ordered list of context keys.
///
/// Append-only: a key's index never changes once assigned.
#[derive(Clone, Debug)]
pub struct Keylist {
    flavor: ContextFlavor,
    keys: IndexSet<Symbol>,
}

impl Keylist {
    /// An empty keylist for the given flavor.
    pub fn new(flavor: ContextFlavor) -> Self {
        Keylist {
            flavor,
            keys: IndexSet::new(),
        }
    }

    /// Build from parameter names in order.
    pub fn from_keys(flavor: ContextFlavor, keys: impl IntoIterator<Item = Symbol>) -> Self {
        Keylist {
            flavor,
            keys: keys.into_iter().collect(),
        }
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when no keys exist.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The flavor this keylist was created for.
    pub fn flavor(&self) -> ContextFlavor {
        self.flavor
    }

    /// Exact-spelling index query.
    pub fn index_of(&self, key: Symbol) -> Option<usize> {
        self.keys.get_index_of(&key)
    }

    /// Case-folded index query: first key whose canonical form matches.
    pub fn index_of_canon(&self, key: Symbol) -> Option<usize> {
        self.keys.iter().position(|k| k.canon_eq(key))
    }

    /// The key at `index`.
    pub fn key_at(&self, index: usize) -> Option<Symbol> {
        self.keys.get_index(index).copied()
    }

    /// Iterate keys in append order.
    pub fn keys(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.keys.iter().copied()
    }

    fn push(&mut self, key: Symbol) -> usize {
        let (index, _) = self.keys.insert_full(key);
        index
    }
}

/// Handle to a context, which is the handle of its varlist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextHandle(SeriesHandle);

impl ContextHandle {
    /// Wrap a varlist handle. The handle must come from one of the
    /// context constructors.
    pub(crate) fn from_varlist(varlist: SeriesHandle) -> ContextHandle {
        ContextHandle(varlist)
    }

    /// The underlying varlist series.
    pub fn varlist(self) -> SeriesHandle {
        self.0
    }

    // ═══════════════════════════════════════════════════════════════════
    // Construction
    // ═══════════════════════════════════════════════════════════════════

    /// Create an empty object or module context.
    pub fn make(heap: &mut Heap, flavor: ContextFlavor, capacity: usize) -> Result<ContextHandle> {
        debug_assert!(flavor != ContextFlavor::Frame, "frames use make_frame");
        let varlist = heap.alloc_array(capacity + 1);
        let handle = ContextHandle(varlist);
        let body = heap.array_mut(varlist)?;
        *body.keylist_slot_mut() = Some(Arc::new(Keylist::new(flavor)));
        body.push(Cell::object(handle))?;
        Ok(handle)
    }

    /// Create a frame varlist for an action activation: the keylist is the
    /// action's paramlist (shared, not copied) and every variable slot
    /// starts blank.
    pub fn make_frame(
        heap: &mut Heap,
        action: ActionHandle,
        keylist: Arc<Keylist>,
    ) -> Result<ContextHandle> {
        let count = keylist.len();
        let varlist = heap.alloc_array(count + 1);
        let handle = ContextHandle(varlist);
        let body = heap.array_mut(varlist)?;
        *body.keylist_slot_mut() = Some(keylist);
        body.push(Cell::frame(handle, action))?;
        for _ in 0..count {
            body.push(Cell::blank())?;
        }
        Ok(handle)
    }

    /// Copy this context: fresh varlist with the same variable values,
    /// sharing the keylist until either side appends.
    pub fn copy(self, heap: &mut Heap) -> Result<ContextHandle> {
        let source = heap.array(self.0)?;
        let keylist = source
            .keylist()
            .cloned()
            .ok_or(CoreError::SeriesTypeMismatch { expected: "varlist" })?;
        let vars: Vec<Cell> = source.cells()[1..].to_vec();
        let old_archetype = source.at(0);

        let varlist = heap.alloc_array(vars.len() + 1);
        let handle = ContextHandle(varlist);
        let body = heap.array_mut(varlist)?;
        *body.keylist_slot_mut() = Some(keylist);
        let archetype = match old_archetype.map(|c| *c.payload()) {
            Some(crate::cell::Payload::FrameOf { action, .. }) => Cell::frame(handle, action),
            _ => Cell::object(handle),
        };
        body.push(archetype)?;
        for var in vars {
            body.push(var)?;
        }
        Ok(handle)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Keys
    // ═══════════════════════════════════════════════════════════════════

    /// The keylist, shared.
    pub fn keys(self, heap: &Heap) -> Result<Arc<Keylist>> {
        heap.array(self.0)?
            .keylist()
            .cloned()
            .ok_or(CoreError::SeriesTypeMismatch { expected: "varlist" })
    }

    /// Number of variables (the archetype slot is not one).
    pub fn len(self, heap: &Heap) -> Result<usize> {
        Ok(heap.array(self.0)?.len().saturating_sub(1))
    }

    /// True when the context has no variables.
    pub fn is_empty(self, heap: &Heap) -> Result<bool> {
        Ok(self.len(heap)? == 0)
    }

    /// Find a variable's slot index.
    ///
    /// `Case::Insensitive` still prefers an exact-spelling hit when one
    /// exists; otherwise the first case-folded match in append order wins.
    pub fn lookup(self, heap: &Heap, key: Symbol, case: Case) -> Result<Option<u32>> {
        let keylist = self.keys(heap)?;
        let found = match case {
            Case::Sensitive => keylist.index_of(key),
            Case::Insensitive => keylist.index_of(key).or_else(|| keylist.index_of_canon(key)),
        };
        Ok(found.map(|i| i as u32))
    }

    /// Append a key, returning its slot index. An existing exact key
    /// returns its original index instead of growing the context.
    ///
    /// When the keylist is shared with another context this forks a
    /// private copy first; the other context keeps the old keylist and all
    /// previously issued indices stay valid on both sides.
    pub fn append(self, heap: &mut Heap, key: Symbol) -> Result<u32> {
        if heap.is_frozen(self.0)? {
            return Err(CoreError::ProtectedSeries {
                what: "frozen context".to_string(),
            });
        }
        let body = heap.array_mut(self.0)?;
        let slot = body
            .keylist_slot_mut()
            .as_mut()
            .ok_or(CoreError::SeriesTypeMismatch { expected: "varlist" })?;

        if let Some(existing) = slot.index_of(key) {
            return Ok(existing as u32);
        }

        // Copy-on-append: fork when shared, mutate in place when unique.
        let index = match Arc::get_mut(slot) {
            Some(keylist) => keylist.push(key),
            None => {
                let mut forked = (**slot).clone();
                let index = forked.push(key);
                *slot = Arc::new(forked);
                index
            }
        };
        body.push(Cell::blank())?;
        debug_assert_eq!(index + 2, body.len(), "keylist and varlist diverged");
        Ok(index as u32)
    }

    /// The key at a slot index.
    pub fn key_at(self, heap: &Heap, index: u32) -> Result<Symbol> {
        self.keys(heap)?
            .key_at(index as usize)
            .ok_or(CoreError::OutOfRange {
                index: index as usize,
            })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Variables
    // ═══════════════════════════════════════════════════════════════════

    /// Read a variable through the ordinary channel: isotopes decay.
    pub fn get_var(self, heap: &Heap, index: u32) -> Result<Cell> {
        Ok(self.get_var_lifted(heap, index)?.decay())
    }

    /// Read a variable preserving its lift state.
    pub fn get_var_lifted(self, heap: &Heap, index: u32) -> Result<Cell> {
        heap.array(self.0)?
            .at(index as usize + 1)
            .ok_or(CoreError::OutOfRange {
                index: index as usize,
            })
    }

    /// Write a variable slot. Frame and object variables are the
    /// sanctioned holders of isotopes, so no storage barrier applies; the
    /// protected bit on the existing cell does.
    pub fn set_var(self, heap: &mut Heap, index: u32, value: Cell) -> Result<()> {
        let body = heap.array_mut(self.0)?;
        let slot = index as usize + 1;
        let old = body.at(slot).ok_or(CoreError::OutOfRange {
            index: index as usize,
        })?;
        if old.is_protected() {
            return Err(CoreError::ProtectedSeries {
                what: "protected variable".to_string(),
            });
        }
        body.write_var_slot(slot, value);
        Ok(())
    }

    /// The archetype cell. Still readable after a frame expires, so
    /// escaped references can report what the frame was.
    pub fn archetype(self, heap: &Heap) -> Result<Cell> {
        match heap.array(self.0) {
            Ok(body) => body.at(0).ok_or(CoreError::SeriesFreed),
            Err(err) => heap.expired_archetype(self.0).ok_or(err),
        }
    }

    /// The context flavor.
    pub fn flavor(self, heap: &Heap) -> Result<ContextFlavor> {
        Ok(self.keys(heap)?.flavor())
    }

    /// Freeze the context permanently: appends and variable writes fail
    /// from now on.
    pub fn freeze(self, heap: &mut Heap) -> Result<()> {
        heap.freeze(self.0)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Binding
    // ═══════════════════════════════════════════════════════════════════

    /// Bind a single word cell to this context, caching the slot index in
    /// the cell. Returns the cell unchanged when the name is absent.
    pub fn bind_cell(self, heap: &Heap, cell: Cell, case: Case) -> Result<Cell> {
        let symbol = match cell.as_word() {
            Some(s) => s,
            None => return Ok(cell),
        };
        Ok(match self.lookup(heap, symbol, case)? {
            Some(index) => cell.with_binding(Binding {
                context: self,
                index,
            }),
            None => cell,
        })
    }

    /// Deep-bind an array to this context: every word-flavored cell whose
    /// name the context knows gets a cached binding, and set-words for
    /// unknown names are appended first (how module-level code acquires
    /// its variables). Nested arrays are walked; already-visited series
    /// are skipped so cyclic structures terminate.
    pub fn bind_block(self, heap: &mut Heap, block: SeriesHandle) -> Result<()> {
        let mut seen: Vec<SeriesHandle> = Vec::new();
        self.bind_walk(heap, block, true, &mut seen)
    }

    /// Like [`bind_block`](Self::bind_block) but never appends: only names
    /// the context already has get rebound. Action bodies bind to their
    /// frame this way, leaving other words on whatever they were bound to
    /// at definition time.
    pub fn bind_existing(self, heap: &mut Heap, block: SeriesHandle) -> Result<()> {
        let mut seen: Vec<SeriesHandle> = Vec::new();
        self.bind_walk(heap, block, false, &mut seen)
    }

    fn bind_walk(
        self,
        heap: &mut Heap,
        block: SeriesHandle,
        collect: bool,
        seen: &mut Vec<SeriesHandle>,
    ) -> Result<()> {
        if seen.contains(&block) {
            return Ok(());
        }
        seen.push(block);

        let count = heap.array(block)?.len();
        for i in 0..count {
            let cell = match heap.array(block)?.at(i) {
                Some(c) => c,
                None => break,
            };
            if cell.kind().is_word_like() {
                let symbol = match cell.as_word() {
                    Some(s) => s,
                    None => continue,
                };
                let index = match self.lookup(heap, symbol, Case::Insensitive)? {
                    Some(index) => Some(index),
                    None if collect && cell.kind() == Kind::SetWord => {
                        Some(self.append(heap, symbol)?)
                    }
                    None => None,
                };
                if let Some(index) = index {
                    let bound = cell.with_binding(Binding {
                        context: self,
                        index,
                    });
                    heap.array_mut(block)?.replace(i, bound)?;
                }
            } else if cell.kind().is_any_array() {
                if let Some((series, _)) = cell.series_ref() {
                    self.bind_walk(heap, series, collect, seen)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;

    fn setup() -> (Heap, SymbolTable) {
        (Heap::new(), SymbolTable::new())
    }

    #[test]
    fn test_make_and_append() {
        let (mut heap, symbols) = setup();
        let ctx = ContextHandle::make(&mut heap, ContextFlavor::Object, 4).unwrap();
        assert_eq!(ctx.len(&heap).unwrap(), 0);

        let alpha = symbols.intern("alpha");
        let beta = symbols.intern("beta");
        assert_eq!(ctx.append(&mut heap, alpha).unwrap(), 0);
        assert_eq!(ctx.append(&mut heap, beta).unwrap(), 1);
        // Existing key: original index, no growth.
        assert_eq!(ctx.append(&mut heap, alpha).unwrap(), 0);
        assert_eq!(ctx.len(&heap).unwrap(), 2);
    }

    #[test]
    fn test_lookup_case_modes() {
        let (mut heap, symbols) = setup();
        let ctx = ContextHandle::make(&mut heap, ContextFlavor::Object, 2).unwrap();
        let mixed = symbols.intern("Value");
        ctx.append(&mut heap, mixed).unwrap();

        let lower = symbols.intern("value");
        assert_eq!(ctx.lookup(&heap, lower, Case::Sensitive).unwrap(), None);
        assert_eq!(ctx.lookup(&heap, lower, Case::Insensitive).unwrap(), Some(0));
        assert_eq!(ctx.lookup(&heap, mixed, Case::Sensitive).unwrap(), Some(0));
    }

    #[test]
    fn test_exact_match_precedes_canon_match() {
        let (mut heap, symbols) = setup();
        let ctx = ContextHandle::make(&mut heap, ContextFlavor::Object, 2).unwrap();
        let upper = symbols.intern("X");
        let lower = symbols.intern("x");
        ctx.append(&mut heap, upper).unwrap();
        ctx.append(&mut heap, lower).unwrap();

        // Insensitive lookup of "x" prefers the exact slot 1 over the
        // canon-equal slot 0.
        assert_eq!(ctx.lookup(&heap, lower, Case::Insensitive).unwrap(), Some(1));
        assert_eq!(ctx.lookup(&heap, upper, Case::Insensitive).unwrap(), Some(0));
    }

    #[test]
    fn test_vars_default_blank_and_roundtrip() {
        let (mut heap, symbols) = setup();
        let ctx = ContextHandle::make(&mut heap, ContextFlavor::Object, 1).unwrap();
        let key = symbols.intern("k");
        let index = ctx.append(&mut heap, key).unwrap();

        assert_eq!(ctx.get_var(&heap, index).unwrap(), Cell::blank());
        ctx.set_var(&mut heap, index, Cell::integer(7)).unwrap();
        assert_eq!(ctx.get_var(&heap, index).unwrap().as_int(), Some(7));
        assert_eq!(ctx.key_at(&heap, index).unwrap(), key);
    }

    #[test]
    fn test_var_slots_hold_isotopes_and_decay_on_read() {
        let (mut heap, symbols) = setup();
        let ctx = ContextHandle::make(&mut heap, ContextFlavor::Object, 1).unwrap();
        let index = ctx.append(&mut heap, symbols.intern("k")).unwrap();

        ctx.set_var(&mut heap, index, Cell::integer(3).isotopic())
            .unwrap();
        assert!(ctx.get_var_lifted(&heap, index).unwrap().is_isotope());
        let plain = ctx.get_var(&heap, index).unwrap();
        assert!(!plain.is_isotope());
        assert_eq!(plain.as_int(), Some(3));
    }

    #[test]
    fn test_keylist_shared_until_append_forks() {
        let (mut heap, symbols) = setup();
        let a = ContextHandle::make(&mut heap, ContextFlavor::Object, 2).unwrap();
        let one = symbols.intern("one");
        a.append(&mut heap, one).unwrap();

        let b = a.copy(&mut heap).unwrap();
        assert!(Arc::ptr_eq(
            &a.keys(&heap).unwrap(),
            &b.keys(&heap).unwrap()
        ));

        // Appending to b forks its keylist; a is untouched.
        let two = symbols.intern("two");
        let index = b.append(&mut heap, two).unwrap();
        assert_eq!(index, 1);
        assert!(!Arc::ptr_eq(
            &a.keys(&heap).unwrap(),
            &b.keys(&heap).unwrap()
        ));
        assert_eq!(a.len(&heap).unwrap(), 1);
        assert_eq!(b.len(&heap).unwrap(), 2);

        // Pre-fork indices agree on both sides.
        assert_eq!(a.lookup(&heap, one, Case::Sensitive).unwrap(), Some(0));
        assert_eq!(b.lookup(&heap, one, Case::Sensitive).unwrap(), Some(0));
    }

    #[test]
    fn test_copy_keeps_values_identity_differs() {
        let (mut heap, symbols) = setup();
        let a = ContextHandle::make(&mut heap, ContextFlavor::Object, 1).unwrap();
        let k = symbols.intern("k");
        let index = a.append(&mut heap, k).unwrap();
        a.set_var(&mut heap, index, Cell::integer(11)).unwrap();

        let b = a.copy(&mut heap).unwrap();
        assert_ne!(a, b);
        assert_eq!(b.get_var(&heap, index).unwrap().as_int(), Some(11));
        // Writes stay separate.
        b.set_var(&mut heap, index, Cell::integer(22)).unwrap();
        assert_eq!(a.get_var(&heap, index).unwrap().as_int(), Some(11));
    }

    #[test]
    fn test_frozen_context_rejects_append_and_set() {
        let (mut heap, symbols) = setup();
        let ctx = ContextHandle::make(&mut heap, ContextFlavor::Object, 1).unwrap();
        let index = ctx.append(&mut heap, symbols.intern("k")).unwrap();
        ctx.freeze(&mut heap).unwrap();

        assert!(matches!(
            ctx.append(&mut heap, symbols.intern("later")),
            Err(CoreError::ProtectedSeries { .. })
        ));
        assert!(matches!(
            ctx.set_var(&mut heap, index, Cell::integer(1)),
            Err(CoreError::ProtectedSeries { .. })
        ));
        // Reads still fine.
        assert_eq!(ctx.get_var(&heap, index).unwrap(), Cell::blank());
    }

    #[test]
    fn test_protected_variable_rejects_write() {
        let (mut heap, symbols) = setup();
        let ctx = ContextHandle::make(&mut heap, ContextFlavor::Object, 1).unwrap();
        let index = ctx.append(&mut heap, symbols.intern("k")).unwrap();
        ctx.set_var(&mut heap, index, Cell::integer(1).with_protected(true))
            .unwrap();
        assert!(matches!(
            ctx.set_var(&mut heap, index, Cell::integer(2)),
            Err(CoreError::ProtectedSeries { .. })
        ));
    }

    #[test]
    fn test_bind_block_attaches_and_appends_set_words() {
        let (mut heap, symbols) = setup();
        let ctx = ContextHandle::make(&mut heap, ContextFlavor::Module, 4).unwrap();
        let known = symbols.intern("known");
        ctx.append(&mut heap, known).unwrap();

        // Build the block [known fresh: unknown]
        let block = heap.alloc_array(3);
        {
            let body = heap.array_mut(block).unwrap();
            body.push(Cell::word(known)).unwrap();
            body.push(Cell::set_word(symbols.intern("fresh"))).unwrap();
            body.push(Cell::word(symbols.intern("unknown"))).unwrap();
        }
        ctx.bind_block(&mut heap, block).unwrap();

        let body = heap.array(block).unwrap();
        assert!(body.at(0).unwrap().binding().is_some());
        // Set-word appended a new variable.
        assert!(body.at(1).unwrap().binding().is_some());
        assert_eq!(ctx.len(&heap).unwrap(), 2);
        // Plain unknown word stays unbound.
        assert!(body.at(2).unwrap().binding().is_none());
    }

    #[test]
    fn test_bind_recurses_into_nested_arrays() {
        let (mut heap, symbols) = setup();
        let ctx = ContextHandle::make(&mut heap, ContextFlavor::Object, 1).unwrap();
        let name = symbols.intern("inner-name");
        ctx.append(&mut heap, name).unwrap();

        let inner = heap.alloc_array(1);
        heap.array_mut(inner)
            .unwrap()
            .push(Cell::word(name))
            .unwrap();
        let outer = heap.alloc_array(1);
        heap.array_mut(outer)
            .unwrap()
            .push(Cell::block(inner))
            .unwrap();

        ctx.bind_block(&mut heap, outer).unwrap();
        assert!(heap.array(inner).unwrap().at(0).unwrap().binding().is_some());
    }
}
