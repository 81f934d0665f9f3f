//! Interned word spellings

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

/// An interned, case-preserving name.
///
/// Two symbols are equal only when their spellings are byte-identical.
/// Every symbol also knows the id of its case-folded canonical form, so
/// case-insensitive comparison needs no table access:
///
/// ```
/// use quickbeam::symbol::SymbolTable;
///
/// let table = SymbolTable::new();
/// let a = table.intern("Append");
/// let b = table.intern("append");
/// assert_ne!(a, b);
/// assert!(a.canon_eq(b));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Symbol {
    id: u32,
    canon: u32,
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl Symbol {
    /// Whether two symbols spell the same name ignoring case.
    pub fn canon_eq(self, other: Symbol) -> bool {
        self.canon == other.canon
    }

    /// Whether this symbol is its own canonical (all-lowercase) form.
    pub fn is_canon(self) -> bool {
        self.id == self.canon
    }
}

/// Intern table mapping spellings to symbols.
///
/// Interning goes through `&self` so the table can be shared freely; the
/// maps come from `dashmap`.
#[derive(Debug, Default)]
pub struct SymbolTable {
    by_spelling: DashMap<Arc<str>, Symbol>,
    spellings: DashMap<u32, Arc<str>>,
    next_id: AtomicU32,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a spelling, returning its symbol.
    ///
    /// Repeated calls with the same spelling return the same symbol.
    pub fn intern(&self, spelling: &str) -> Symbol {
        if let Some(sym) = self.by_spelling.get(spelling) {
            return *sym;
        }

        // Resolve the canonical form first so no map entry is held while
        // interning another spelling.
        let folded = spelling.to_lowercase();
        let canon = if folded == spelling {
            None
        } else {
            Some(self.intern(&folded).id)
        };

        let key: Arc<str> = Arc::from(spelling);
        let sym = *self
            .by_spelling
            .entry(Arc::clone(&key))
            .or_insert_with(|| {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let sym = Symbol {
                    id,
                    canon: canon.unwrap_or(id),
                };
                self.spellings.insert(id, key);
                sym
            });
        sym
    }

    /// The spelling of a previously interned symbol.
    pub fn spelling(&self, sym: Symbol) -> Arc<str> {
        match self.spellings.get(&sym.id) {
            Some(s) => Arc::clone(&s),
            // Symbols only come from intern(), so the id is always present;
            // a hand-rolled Symbol from another table gets a marker instead
            // of a panic.
            None => Arc::from("#unknown-symbol"),
        }
    }

    /// Number of distinct spellings interned so far.
    pub fn len(&self) -> usize {
        self.by_spelling.len()
    }

    /// True when nothing has been interned.
    pub fn is_empty(&self) -> bool {
        self.by_spelling.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_identity() {
        let table = SymbolTable::new();
        let a = table.intern("foo");
        let b = table.intern("foo");
        assert_eq!(a, b);
        assert_eq!(&*table.spelling(a), "foo");
    }

    #[test]
    fn test_intern_distinct() {
        let table = SymbolTable::new();
        let a = table.intern("foo");
        let b = table.intern("bar");
        assert_ne!(a, b);
    }

    #[test]
    fn test_case_preserved_but_canon_shared() {
        let table = SymbolTable::new();
        let upper = table.intern("Print");
        let lower = table.intern("print");
        let mixed = table.intern("PRINT");

        assert_ne!(upper, lower);
        assert_ne!(upper, mixed);
        assert!(upper.canon_eq(lower));
        assert!(upper.canon_eq(mixed));
        assert!(lower.is_canon());
        assert!(!upper.is_canon());

        assert_eq!(&*table.spelling(upper), "Print");
        assert_eq!(&*table.spelling(mixed), "PRINT");
    }

    #[test]
    fn test_canon_of_canon_is_itself() {
        let table = SymbolTable::new();
        let sym = table.intern("already-lower");
        assert!(sym.is_canon());
        assert!(sym.canon_eq(sym));
    }
}
