//! Cell-sequence storage with layout metadata
//!
//! An `ArrayBody` is the in-slot content of an array series: the cells, a
//! newline-before bit per slot (so scanned layout survives into rendering),
//! and the source origin when the scanner produced it. Varlists are arrays
//! whose body also carries the context keylist; their slot 0 holds the
//! archetype and is managed by the context code, not by callers.

use std::sync::Arc;

use crate::cell::Cell;
use crate::context::Keylist;
use crate::error::{CoreError, Result};

/// Where an array came from, for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Origin {
    /// File label handed to the scanner
    pub file: Option<Arc<str>>,
    /// 1-based line where the array began
    pub line: u32,
}

/// The content of an array series.
#[derive(Clone, Debug, Default)]
pub struct ArrayBody {
    cells: Vec<Cell>,
    newlines: Vec<bool>,
    origin: Option<Origin>,
    keylist: Option<Arc<Keylist>>,
}

impl ArrayBody {
    /// An empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty array with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        ArrayBody {
            cells: Vec::with_capacity(capacity),
            newlines: Vec::with_capacity(capacity),
            origin: None,
            keylist: None,
        }
    }

    /// Build from existing cells. Layout bits start cleared.
    pub fn from_cells(cells: Vec<Cell>) -> Self {
        debug_assert!(
            cells.iter().all(|c| !c.is_isotope()),
            "isotope smuggled into array construction"
        );
        let newlines = vec![false; cells.len()];
        ArrayBody {
            cells,
            newlines,
            origin: None,
            keylist: None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Element access
    // ═══════════════════════════════════════════════════════════════════

    /// Number of cells, including a varlist's archetype slot.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True when there are no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The cell at `index`, copied out.
    pub fn at(&self, index: usize) -> Option<Cell> {
        self.cells.get(index).copied()
    }

    /// All cells as a slice.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    // ═══════════════════════════════════════════════════════════════════
    // Mutation (isotope write barrier applies)
    // ═══════════════════════════════════════════════════════════════════

    /// Append a cell.
    pub fn push(&mut self, cell: Cell) -> Result<()> {
        self.check_storable(&cell)?;
        self.cells.push(cell);
        self.newlines.push(false);
        Ok(())
    }

    /// Insert a cell at `index`, shifting the rest right.
    pub fn insert(&mut self, index: usize, cell: Cell) -> Result<()> {
        self.check_storable(&cell)?;
        self.cells.insert(index, cell);
        self.newlines.insert(index, false);
        Ok(())
    }

    /// Overwrite the cell at `index`, returning the previous one.
    ///
    /// Fails when the old cell carries the protected bit.
    pub fn replace(&mut self, index: usize, cell: Cell) -> Result<Cell> {
        self.check_storable(&cell)?;
        let old = self.cells[index];
        if old.is_protected() {
            return Err(CoreError::ProtectedSeries {
                what: "protected cell".to_string(),
            });
        }
        self.cells[index] = cell;
        Ok(old)
    }

    /// Remove and return the cell at `index`.
    pub fn remove(&mut self, index: usize) -> Cell {
        self.newlines.remove(index);
        self.cells.remove(index)
    }

    /// Reserve room for `additional` more cells.
    pub fn reserve(&mut self, additional: usize) {
        self.cells.reserve(additional);
        self.newlines.reserve(additional);
    }

    /// Direct slot write without the isotope barrier. Context variable
    /// slots are the sanctioned transient channel for isotopes.
    pub(crate) fn write_var_slot(&mut self, index: usize, cell: Cell) {
        self.cells[index] = cell;
    }

    fn check_storable(&self, cell: &Cell) -> Result<()> {
        if cell.is_isotope() && self.keylist.is_none() {
            return Err(CoreError::IllegalIsotopeStorage {
                kind: cell.kind().name().to_string(),
            });
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Layout metadata
    // ═══════════════════════════════════════════════════════════════════

    /// Whether the value at `index` began on a fresh source line.
    pub fn newline_before(&self, index: usize) -> bool {
        self.newlines.get(index).copied().unwrap_or(false)
    }

    /// Set or clear the newline-before flag for `index`.
    pub fn set_newline_before(&mut self, index: usize, on: bool) {
        if let Some(flag) = self.newlines.get_mut(index) {
            *flag = on;
        }
    }

    /// Source origin, when scanned.
    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    /// Record where this array came from.
    pub fn set_origin(&mut self, file: Option<Arc<str>>, line: u32) {
        self.origin = Some(Origin { file, line });
    }

    // ═══════════════════════════════════════════════════════════════════
    // Varlist support
    // ═══════════════════════════════════════════════════════════════════

    /// Whether this body is a context varlist.
    pub fn is_varlist(&self) -> bool {
        self.keylist.is_some()
    }

    /// The keylist, when this body is a varlist.
    pub fn keylist(&self) -> Option<&Arc<Keylist>> {
        self.keylist.as_ref()
    }

    pub(crate) fn keylist_slot_mut(&mut self) -> &mut Option<Arc<Keylist>> {
        &mut self.keylist
    }

    // ═══════════════════════════════════════════════════════════════════
    // Copying
    // ═══════════════════════════════════════════════════════════════════

    /// Copy cells and layout metadata. Nested series stay shared, and the
    /// copy is an ordinary array even when the source was a varlist.
    pub fn copy_shallow(&self) -> ArrayBody {
        ArrayBody {
            cells: self.cells.clone(),
            newlines: self.newlines.clone(),
            origin: self.origin.clone(),
            keylist: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Kind;

    #[test]
    fn test_push_and_at() {
        let mut body = ArrayBody::new();
        body.push(Cell::integer(1)).unwrap();
        body.push(Cell::integer(2)).unwrap();
        assert_eq!(body.len(), 2);
        assert_eq!(body.at(0).unwrap().as_int(), Some(1));
        assert_eq!(body.at(2), None);
    }

    #[test]
    fn test_isotope_write_barrier() {
        let mut body = ArrayBody::new();
        let err = body.push(Cell::integer(1).isotopic()).unwrap_err();
        assert_eq!(
            err,
            CoreError::IllegalIsotopeStorage {
                kind: Kind::Integer.name().to_string()
            }
        );
        assert!(body.is_empty());
    }

    #[test]
    fn test_isotope_barrier_covers_insert_and_replace() {
        let mut body = ArrayBody::from_cells(vec![Cell::blank()]);
        assert!(body.insert(0, Cell::blank().isotopic()).is_err());
        assert!(body.replace(0, Cell::blank().isotopic()).is_err());
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_replace_protected_cell_fails() {
        let mut body = ArrayBody::from_cells(vec![Cell::integer(1).with_protected(true)]);
        let err = body.replace(0, Cell::integer(2)).unwrap_err();
        assert!(matches!(err, CoreError::ProtectedSeries { .. }));
        assert_eq!(body.at(0).unwrap().as_int(), Some(1));
    }

    #[test]
    fn test_newline_flags_track_inserts() {
        let mut body = ArrayBody::new();
        body.push(Cell::integer(1)).unwrap();
        body.push(Cell::integer(2)).unwrap();
        body.set_newline_before(1, true);
        assert!(body.newline_before(1));

        body.insert(1, Cell::integer(9)).unwrap();
        assert!(!body.newline_before(1));
        assert!(body.newline_before(2));

        body.remove(1);
        assert!(body.newline_before(1));
    }

    #[test]
    fn test_shallow_copy_keeps_layout_drops_keylist() {
        let mut body = ArrayBody::new();
        body.push(Cell::integer(1)).unwrap();
        body.set_newline_before(0, true);
        body.set_origin(Some(Arc::from("test.qb")), 3);

        let copy = body.copy_shallow();
        assert!(copy.newline_before(0));
        assert_eq!(copy.origin().unwrap().line, 3);
        assert!(!copy.is_varlist());
    }
}
