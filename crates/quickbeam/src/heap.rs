//! Series heap: an arena of generation-checked slots
//!
//! Every string, binary, and array lives in a heap slot addressed by a
//! `SeriesHandle` (index plus generation). Freeing or expiring a slot
//! changes what the generation check accepts, so stale handles report
//! `SeriesFreed` or `FrameExpired` instead of reading reused memory.
//! Collection is mark-and-sweep and runs only between evaluation steps.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use crate::array::ArrayBody;
use crate::cell::{Cell, Payload};
use crate::context::ContextHandle;
use crate::error::{CoreError, Result};

/// Handle to a heap slot. Copyable, comparable, and safe to hold across
/// collections: a dead slot is detected, never silently reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesHandle {
    index: u32,
    generation: u32,
}

/// Why a slot was retired while keeping its identity.
#[derive(Clone, Debug)]
enum ExpireReason {
    /// Content was explicitly discarded or repossessed
    Discarded,
    /// A frame returned without being captured
    FrameReturned { label: Option<Arc<str>> },
}

/// Content of a live slot.
#[derive(Clone, Debug)]
pub(crate) enum StubBody {
    /// Byte elements (texts, binaries, overlong runes)
    Bytes(Vec<u8>),
    /// Cell elements
    Cells(ArrayBody),
}

/// A live series: body plus series-level flags.
#[derive(Clone, Debug)]
struct Stub {
    body: StubBody,
    managed: bool,
    frozen: bool,
    marked: bool,
}

impl Stub {
    fn new(body: StubBody, managed: bool) -> Stub {
        Stub {
            body,
            managed,
            frozen: false,
            marked: false,
        }
    }
}

#[derive(Clone, Debug)]
enum Slot {
    /// Reusable; `generation` is what the next occupant will get
    Free { generation: u32 },
    Live { generation: u32, stub: Stub },
    /// Terminal tombstone: identity remains, content is gone
    Expired {
        generation: u32,
        reason: ExpireReason,
        archetype: Option<Cell>,
    },
}

/// Default allocation count between automatic collections.
pub(crate) const DEFAULT_COLLECT_THRESHOLD: usize = 4096;

/// The series arena.
#[derive(Debug)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    holds: Vec<SeriesHandle>,
    allocs_since_collect: usize,
    collect_threshold: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}

impl Heap {
    /// Create an empty heap.
    pub fn new() -> Self {
        Heap {
            slots: Vec::new(),
            free: Vec::new(),
            holds: Vec::new(),
            allocs_since_collect: 0,
            collect_threshold: DEFAULT_COLLECT_THRESHOLD,
        }
    }

    /// Create a heap with a custom automatic-collection threshold.
    pub fn with_collect_threshold(threshold: usize) -> Self {
        Heap {
            collect_threshold: threshold,
            ..Heap::new()
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Allocation
    // ═══════════════════════════════════════════════════════════════════

    fn install(&mut self, stub: Stub) -> SeriesHandle {
        self.allocs_since_collect += 1;
        if let Some(index) = self.free.pop() {
            let generation = match self.slots[index as usize] {
                Slot::Free { generation } => generation,
                // The free list only ever holds Free slots.
                _ => 1,
            };
            self.slots[index as usize] = Slot::Live { generation, stub };
            SeriesHandle { index, generation }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot::Live {
                generation: 1,
                stub,
            });
            SeriesHandle {
                index,
                generation: 1,
            }
        }
    }

    /// Allocate a managed byte series with reserved capacity.
    pub fn alloc_bytes(&mut self, capacity: usize) -> SeriesHandle {
        self.install(Stub::new(StubBody::Bytes(Vec::with_capacity(capacity)), true))
    }

    /// Allocate an unmanaged byte series. The collector never sweeps it;
    /// free it with [`Heap::release`].
    pub fn alloc_bytes_unmanaged(&mut self, capacity: usize) -> SeriesHandle {
        self.install(Stub::new(
            StubBody::Bytes(Vec::with_capacity(capacity)),
            false,
        ))
    }

    /// Take ownership of an existing buffer without copying it.
    pub fn adopt_bytes(&mut self, bytes: Vec<u8>) -> SeriesHandle {
        self.install(Stub::new(StubBody::Bytes(bytes), true))
    }

    /// Allocate a managed array series with reserved capacity.
    pub fn alloc_array(&mut self, capacity: usize) -> SeriesHandle {
        self.install(Stub::new(
            StubBody::Cells(ArrayBody::with_capacity(capacity)),
            true,
        ))
    }

    /// Allocate an unmanaged array series.
    pub fn alloc_array_unmanaged(&mut self, capacity: usize) -> SeriesHandle {
        self.install(Stub::new(
            StubBody::Cells(ArrayBody::with_capacity(capacity)),
            false,
        ))
    }

    /// Install a fully built array body as a managed series.
    pub fn alloc_array_body(&mut self, body: ArrayBody) -> SeriesHandle {
        self.install(Stub::new(StubBody::Cells(body), true))
    }

    /// Allocate a text series holding `content`.
    pub fn alloc_text(&mut self, content: &str) -> SeriesHandle {
        self.adopt_bytes(content.as_bytes().to_vec())
    }

    /// Build a rune cell: inline when the content fits, series-backed
    /// otherwise.
    pub fn alloc_rune(&mut self, content: &str) -> Cell {
        match Cell::rune(content) {
            Some(cell) => cell,
            None => {
                let series = self.adopt_bytes(content.as_bytes().to_vec());
                Cell::series_at(crate::cell::Kind::Rune, series, 0)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Access
    // ═══════════════════════════════════════════════════════════════════

    fn stub(&self, handle: SeriesHandle) -> Result<&Stub> {
        match self.slots.get(handle.index as usize) {
            Some(Slot::Live { generation, stub }) if *generation == handle.generation => Ok(stub),
            Some(Slot::Expired {
                generation, reason, ..
            }) if *generation == handle.generation => Err(expired_error(reason)),
            _ => Err(CoreError::SeriesFreed),
        }
    }

    fn stub_mut(&mut self, handle: SeriesHandle) -> Result<&mut Stub> {
        match self.slots.get_mut(handle.index as usize) {
            Some(Slot::Live { generation, stub }) if *generation == handle.generation => Ok(stub),
            Some(Slot::Expired {
                generation, reason, ..
            }) if *generation == handle.generation => Err(expired_error(reason)),
            _ => Err(CoreError::SeriesFreed),
        }
    }

    fn body_mut(&mut self, handle: SeriesHandle) -> Result<&mut StubBody> {
        let stub = self.stub_mut(handle)?;
        if stub.frozen {
            return Err(CoreError::ProtectedSeries {
                what: "frozen series".to_string(),
            });
        }
        Ok(&mut stub.body)
    }

    /// Byte content of a byte-backed series.
    pub fn bytes(&self, handle: SeriesHandle) -> Result<&[u8]> {
        match &self.stub(handle)?.body {
            StubBody::Bytes(v) => Ok(v),
            StubBody::Cells(_) => Err(CoreError::SeriesTypeMismatch { expected: "byte" }),
        }
    }

    /// Mutable byte content. Fails on frozen series.
    pub fn bytes_mut(&mut self, handle: SeriesHandle) -> Result<&mut Vec<u8>> {
        match self.body_mut(handle)? {
            StubBody::Bytes(v) => Ok(v),
            StubBody::Cells(_) => Err(CoreError::SeriesTypeMismatch { expected: "byte" }),
        }
    }

    /// Byte content interpreted as UTF-8 text.
    pub fn text(&self, handle: SeriesHandle) -> Result<&str> {
        std::str::from_utf8(self.bytes(handle)?)
            .map_err(|_| CoreError::SeriesTypeMismatch { expected: "utf-8" })
    }

    /// Array content of a cell-backed series.
    pub fn array(&self, handle: SeriesHandle) -> Result<&ArrayBody> {
        match &self.stub(handle)?.body {
            StubBody::Cells(body) => Ok(body),
            StubBody::Bytes(_) => Err(CoreError::SeriesTypeMismatch { expected: "cell" }),
        }
    }

    /// Mutable array content. Fails on frozen series.
    pub fn array_mut(&mut self, handle: SeriesHandle) -> Result<&mut ArrayBody> {
        match self.body_mut(handle)? {
            StubBody::Cells(body) => Ok(body),
            StubBody::Bytes(_) => Err(CoreError::SeriesTypeMismatch { expected: "cell" }),
        }
    }

    /// Element count: bytes for byte series, cells for arrays.
    pub fn len(&self, handle: SeriesHandle) -> Result<usize> {
        Ok(match &self.stub(handle)?.body {
            StubBody::Bytes(v) => v.len(),
            StubBody::Cells(body) => body.len(),
        })
    }

    /// Whether the handle still refers to a live slot.
    pub fn is_live(&self, handle: SeriesHandle) -> bool {
        self.stub(handle).is_ok()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Capacity and state transitions
    // ═══════════════════════════════════════════════════════════════════

    /// Reserve room for `additional` more elements. Growth is amortized
    /// doubling underneath; handles and indices stay valid, only borrowed
    /// slices must be re-derived afterwards.
    pub fn grow(&mut self, handle: SeriesHandle, additional: usize) -> Result<()> {
        match self.body_mut(handle)? {
            StubBody::Bytes(v) => v.reserve(additional),
            StubBody::Cells(body) => body.reserve(additional),
        }
        Ok(())
    }

    /// Permanently freeze a series. Later mutation fails with
    /// `ProtectedSeries`; there is no thaw.
    pub fn freeze(&mut self, handle: SeriesHandle) -> Result<()> {
        self.stub_mut(handle)?.frozen = true;
        Ok(())
    }

    /// Whether the series is frozen.
    pub fn is_frozen(&self, handle: SeriesHandle) -> Result<bool> {
        Ok(self.stub(handle)?.frozen)
    }

    /// Free a slot immediately. Meant for unmanaged series; the slot is
    /// recycled and stale handles report `SeriesFreed`.
    pub fn release(&mut self, handle: SeriesHandle) -> Result<()> {
        // Validate first so double-release reports cleanly.
        self.stub(handle)?;
        self.slots[handle.index as usize] = Slot::Free {
            generation: handle.generation + 1,
        };
        self.free.push(handle.index);
        Ok(())
    }

    /// Retire a slot while keeping its identity: the handle stays
    /// recognizable but reads fail with `SeriesFreed`.
    pub fn mark_inaccessible(&mut self, handle: SeriesHandle) -> Result<()> {
        self.stub(handle)?;
        self.slots[handle.index as usize] = Slot::Expired {
            generation: handle.generation,
            reason: ExpireReason::Discarded,
            archetype: None,
        };
        Ok(())
    }

    /// Retire a frame varlist after an uncaptured return. Variable reads
    /// fail with `FrameExpired`, while the archetype remains queryable so
    /// escaped references can still say which action the frame ran.
    pub fn expire_frame(
        &mut self,
        handle: SeriesHandle,
        archetype: Cell,
        label: Option<Arc<str>>,
    ) -> Result<()> {
        self.stub(handle)?;
        self.slots[handle.index as usize] = Slot::Expired {
            generation: handle.generation,
            reason: ExpireReason::FrameReturned { label },
            archetype: Some(archetype),
        };
        Ok(())
    }

    /// The archetype retained by an expired frame slot, if any.
    pub fn expired_archetype(&self, handle: SeriesHandle) -> Option<Cell> {
        match self.slots.get(handle.index as usize) {
            Some(Slot::Expired {
                generation,
                archetype,
                ..
            }) if *generation == handle.generation => *archetype,
            _ => None,
        }
    }

    /// Repossess a byte buffer: the caller gets the `Vec` back without a
    /// copy and the slot becomes inaccessible.
    pub fn take_bytes(&mut self, handle: SeriesHandle) -> Result<Vec<u8>> {
        match &self.stub(handle)?.body {
            StubBody::Bytes(_) => {}
            StubBody::Cells(_) => {
                return Err(CoreError::SeriesTypeMismatch { expected: "byte" })
            }
        }
        let slot = std::mem::replace(
            &mut self.slots[handle.index as usize],
            Slot::Expired {
                generation: handle.generation,
                reason: ExpireReason::Discarded,
                archetype: None,
            },
        );
        match slot {
            Slot::Live {
                stub:
                    Stub {
                        body: StubBody::Bytes(v),
                        ..
                    },
                ..
            } => Ok(v),
            // stub() above guaranteed a live byte slot.
            _ => Err(CoreError::SeriesFreed),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Copying
    // ═══════════════════════════════════════════════════════════════════

    /// Deep copy an array: nested arrays, byte series, and live contexts
    /// are duplicated recursively, while frozen series stay shared by
    /// reference. A duplicated context shares the source's keylist and
    /// gets a rebuilt archetype; cells naming an expired frame keep
    /// pointing at the original tombstone. Shared and cyclic structure in
    /// the source stays shared in the copy.
    pub fn copy_array_deep(&mut self, handle: SeriesHandle) -> Result<SeriesHandle> {
        let mut seen: IndexMap<SeriesHandle, SeriesHandle> = IndexMap::new();
        self.copy_deep_walk(handle, &mut seen)
    }

    fn copy_deep_walk(
        &mut self,
        handle: SeriesHandle,
        seen: &mut IndexMap<SeriesHandle, SeriesHandle>,
    ) -> Result<SeriesHandle> {
        if let Some(copy) = seen.get(&handle) {
            return Ok(*copy);
        }
        if self.is_frozen(handle)? {
            return Ok(handle);
        }
        match self.stub(handle)?.body.clone() {
            StubBody::Bytes(bytes) => {
                let copy = self.adopt_bytes(bytes);
                seen.insert(handle, copy);
                Ok(copy)
            }
            StubBody::Cells(mut body) => {
                // Reserve the copy before walking children so cycles and
                // varlist archetypes resolve to it. The cloned body keeps
                // the keylist, so a copied varlist is itself a varlist.
                let copy = self.alloc_array(0);
                seen.insert(handle, copy);
                for i in 0..body.len() {
                    let cell = match body.at(i) {
                        Some(c) => c,
                        None => break,
                    };
                    if let Some((child, _)) = cell.series_ref() {
                        let child_copy = self.copy_deep_walk(child, seen)?;
                        body.write_var_slot(i, cell.with_series(child_copy));
                    } else if let Some(context) = cell.context_ref() {
                        if self.is_live(context.varlist()) {
                            let child_copy = self.copy_deep_walk(context.varlist(), seen)?;
                            body.write_var_slot(
                                i,
                                cell.with_context(ContextHandle::from_varlist(child_copy)),
                            );
                        }
                    }
                }
                *self.array_mut(copy)? = body;
                Ok(copy)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Collection
    // ═══════════════════════════════════════════════════════════════════

    /// Keep a series alive across collections regardless of cell
    /// reachability. Pairs with [`Heap::drop_hold`].
    pub fn push_hold(&mut self, handle: SeriesHandle) {
        self.holds.push(handle);
    }

    /// Remove the most recent hold on `handle`.
    pub fn drop_hold(&mut self, handle: SeriesHandle) {
        if let Some(pos) = self.holds.iter().rposition(|h| *h == handle) {
            self.holds.remove(pos);
        }
    }

    /// Whether enough allocation has happened to warrant a collection.
    pub fn should_collect(&self) -> bool {
        self.allocs_since_collect >= self.collect_threshold
    }

    /// Mark-and-sweep over managed slots. `extra_roots` joins the hold
    /// list as the root set; everything reachable from a root through cell
    /// payloads survives. Expired slots persist while a reachable cell
    /// still names them and are reclaimed once nothing does. Returns the
    /// number of slots swept.
    pub fn collect(&mut self, extra_roots: &[SeriesHandle]) -> usize {
        let mut work: Vec<SeriesHandle> = Vec::with_capacity(self.holds.len() + extra_roots.len());
        work.extend_from_slice(&self.holds);
        work.extend_from_slice(extra_roots);
        let mut expired_reached = vec![false; self.slots.len()];

        // Mark phase.
        while let Some(handle) = work.pop() {
            let slot = match self.slots.get_mut(handle.index as usize) {
                Some(slot) => slot,
                None => continue,
            };
            let stub = match slot {
                Slot::Live { generation, stub } if *generation == handle.generation => stub,
                // Tombstone archetypes reference nothing beyond their own
                // slot, so reachability is all that gets recorded.
                Slot::Expired { generation, .. } if *generation == handle.generation => {
                    expired_reached[handle.index as usize] = true;
                    continue;
                }
                _ => continue,
            };
            if stub.marked {
                continue;
            }
            stub.marked = true;
            if let StubBody::Cells(body) = &stub.body {
                for cell in body.cells() {
                    push_cell_refs(cell, &mut work);
                }
            }
        }

        // Sweep phase.
        let mut swept = 0;
        let mut live = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            match slot {
                Slot::Live { generation, stub } => {
                    if stub.marked {
                        stub.marked = false;
                        live += 1;
                    } else if stub.managed {
                        *slot = Slot::Free {
                            generation: *generation + 1,
                        };
                        self.free.push(index as u32);
                        swept += 1;
                    } else {
                        live += 1;
                    }
                }
                Slot::Expired { generation, .. } => {
                    if !expired_reached[index] {
                        *slot = Slot::Free {
                            generation: *generation + 1,
                        };
                        self.free.push(index as u32);
                        swept += 1;
                    }
                }
                Slot::Free { .. } => {}
            }
        }

        self.allocs_since_collect = 0;
        trace!(swept, live, "heap collected");
        swept
    }

    /// Number of live slots, managed or not.
    pub fn live_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Live { .. }))
            .count()
    }
}

fn expired_error(reason: &ExpireReason) -> CoreError {
    match reason {
        ExpireReason::Discarded => CoreError::SeriesFreed,
        ExpireReason::FrameReturned { label } => CoreError::FrameExpired {
            action: label.as_ref().map(|l| l.to_string()),
        },
    }
}

/// Push every heap reference a cell carries onto the mark worklist.
fn push_cell_refs(cell: &Cell, work: &mut Vec<SeriesHandle>) {
    match cell.payload() {
        Payload::Series { series, .. } => work.push(*series),
        Payload::Context(ctx) => work.push(ctx.varlist()),
        Payload::FrameOf { varlist, .. } => work.push(varlist.varlist()),
        Payload::Word {
            binding: Some(binding),
            ..
        } => work.push(binding.context.varlist()),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_read_bytes() {
        let mut heap = Heap::new();
        let h = heap.adopt_bytes(vec![1, 2, 3]);
        assert_eq!(heap.bytes(h).unwrap(), &[1, 2, 3]);
        assert_eq!(heap.len(h).unwrap(), 3);
    }

    #[test]
    fn test_release_invalidates_handle() {
        let mut heap = Heap::new();
        let h = heap.alloc_bytes_unmanaged(8);
        heap.release(h).unwrap();
        assert_eq!(heap.bytes(h).unwrap_err(), CoreError::SeriesFreed);
        assert_eq!(heap.release(h).unwrap_err(), CoreError::SeriesFreed);
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut heap = Heap::new();
        let first = heap.alloc_bytes_unmanaged(0);
        heap.release(first).unwrap();
        let second = heap.adopt_bytes(vec![9]);
        // Same slot, new generation: the old handle stays dead.
        assert_ne!(first, second);
        assert!(heap.bytes(first).is_err());
        assert_eq!(heap.bytes(second).unwrap(), &[9]);
    }

    #[test]
    fn test_freeze_blocks_mutation() {
        let mut heap = Heap::new();
        let h = heap.adopt_bytes(vec![1]);
        heap.freeze(h).unwrap();
        assert!(heap.is_frozen(h).unwrap());
        let err = heap.bytes_mut(h).unwrap_err();
        assert!(matches!(err, CoreError::ProtectedSeries { .. }));
        // Reading still works.
        assert_eq!(heap.bytes(h).unwrap(), &[1]);
    }

    #[test]
    fn test_mark_inaccessible_reports_series_freed() {
        let mut heap = Heap::new();
        let h = heap.adopt_bytes(vec![1]);
        heap.mark_inaccessible(h).unwrap();
        assert_eq!(heap.bytes(h).unwrap_err(), CoreError::SeriesFreed);
    }

    #[test]
    fn test_take_bytes_repossesses_without_copy() {
        let mut heap = Heap::new();
        let h = heap.adopt_bytes(vec![5, 6, 7]);
        let buf = heap.take_bytes(h).unwrap();
        assert_eq!(buf, vec![5, 6, 7]);
        assert_eq!(heap.bytes(h).unwrap_err(), CoreError::SeriesFreed);
    }

    #[test]
    fn test_collect_sweeps_unreachable_managed() {
        let mut heap = Heap::new();
        let kept = heap.adopt_bytes(vec![1]);
        let _lost = heap.adopt_bytes(vec![2]);
        heap.push_hold(kept);

        let swept = heap.collect(&[]);
        assert_eq!(swept, 1);
        assert!(heap.bytes(kept).is_ok());
    }

    #[test]
    fn test_collect_traces_through_arrays() {
        let mut heap = Heap::new();
        let inner = heap.adopt_bytes(vec![1]);
        let outer = heap.alloc_array(1);
        heap.array_mut(outer)
            .unwrap()
            .push(Cell::text(inner))
            .unwrap();
        heap.push_hold(outer);

        let swept = heap.collect(&[]);
        assert_eq!(swept, 0);
        assert!(heap.bytes(inner).is_ok());

        heap.drop_hold(outer);
        let swept = heap.collect(&[]);
        assert_eq!(swept, 2);
    }

    #[test]
    fn test_collect_spares_unmanaged() {
        let mut heap = Heap::new();
        let h = heap.alloc_bytes_unmanaged(4);
        let swept = heap.collect(&[]);
        assert_eq!(swept, 0);
        assert!(heap.bytes(h).is_ok());
    }

    #[test]
    fn test_rune_fallback_to_series() {
        let mut heap = Heap::new();
        let short = heap.alloc_rune("go");
        assert_eq!(short.rune_text(), Some("go"));

        let long = heap.alloc_rune("a-rune-well-beyond-the-inline-limit");
        assert_eq!(long.rune_text(), None);
        let (series, _) = long.series_ref().unwrap();
        assert_eq!(
            heap.text(series).unwrap(),
            "a-rune-well-beyond-the-inline-limit"
        );
    }

    #[test]
    fn test_deep_copy_duplicates_children() {
        let mut heap = Heap::new();
        let inner = heap.alloc_array(1);
        heap.array_mut(inner).unwrap().push(Cell::integer(1)).unwrap();
        let text = heap.alloc_text("shared");
        let outer = heap.alloc_array(2);
        {
            let body = heap.array_mut(outer).unwrap();
            body.push(Cell::block(inner)).unwrap();
            body.push(Cell::text(text)).unwrap();
        }

        let copy = heap.copy_array_deep(outer).unwrap();
        assert_ne!(copy, outer);
        let (inner_copy, _) = heap.array(copy).unwrap().at(0).unwrap().series_ref().unwrap();
        let (text_copy, _) = heap.array(copy).unwrap().at(1).unwrap().series_ref().unwrap();
        assert_ne!(inner_copy, inner);
        assert_ne!(text_copy, text);

        // Mutating the copy leaves the source alone.
        heap.array_mut(inner_copy)
            .unwrap()
            .push(Cell::integer(2))
            .unwrap();
        assert_eq!(heap.array(inner).unwrap().len(), 1);
        assert_eq!(heap.text(text_copy).unwrap(), "shared");
    }

    #[test]
    fn test_deep_copy_keeps_cycles_and_frozen_sharing() {
        let mut heap = Heap::new();
        let cyclic = heap.alloc_array(1);
        heap.array_mut(cyclic)
            .unwrap()
            .push(Cell::block(cyclic))
            .unwrap();
        let copy = heap.copy_array_deep(cyclic).unwrap();
        let (self_ref, _) = heap.array(copy).unwrap().at(0).unwrap().series_ref().unwrap();
        assert_eq!(self_ref, copy);

        let frozen = heap.alloc_text("constant");
        heap.freeze(frozen).unwrap();
        let holder = heap.alloc_array(1);
        heap.array_mut(holder)
            .unwrap()
            .push(Cell::text(frozen))
            .unwrap();
        let holder_copy = heap.copy_array_deep(holder).unwrap();
        let (kept, _) = heap
            .array(holder_copy)
            .unwrap()
            .at(0)
            .unwrap()
            .series_ref()
            .unwrap();
        assert_eq!(kept, frozen);
    }
}
