use quickbeam::*;

// ═══════════════════════════════════════════════════════════════════════
// Handle validity
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_released_slots_reject_stale_handles() {
    let mut heap = Heap::new();
    let old = heap.alloc_bytes_unmanaged(4);
    heap.bytes_mut(old).unwrap().extend_from_slice(b"abcd");
    heap.release(old).unwrap();

    assert!(!heap.is_live(old));
    assert!(matches!(heap.bytes(old), Err(CoreError::SeriesFreed)));

    // The slot gets recycled, and the stale handle still misses.
    let new = heap.alloc_bytes_unmanaged(4);
    heap.bytes_mut(new).unwrap().push(9);
    assert!(matches!(heap.bytes(old), Err(CoreError::SeriesFreed)));
    assert_eq!(heap.bytes(new).unwrap(), &[9]);
}

#[test]
fn test_double_release_reports_cleanly() {
    let mut heap = Heap::new();
    let h = heap.alloc_bytes_unmanaged(0);
    heap.release(h).unwrap();
    assert!(matches!(heap.release(h), Err(CoreError::SeriesFreed)));
}

#[test]
fn test_take_bytes_repossesses_the_buffer() {
    let mut heap = Heap::new();
    let h = heap.adopt_bytes(vec![1, 2, 3]);
    heap.bytes_mut(h).unwrap().push(4);

    let taken = heap.take_bytes(h).unwrap();
    assert_eq!(taken, vec![1, 2, 3, 4]);
    assert!(matches!(heap.bytes(h), Err(CoreError::SeriesFreed)));

    let arr = heap.alloc_array(0);
    assert!(matches!(
        heap.take_bytes(arr),
        Err(CoreError::SeriesTypeMismatch { expected: "byte" })
    ));
}

#[test]
fn test_grow_keeps_content() {
    let mut heap = Heap::new();
    let h = heap.adopt_bytes(vec![7, 8]);
    heap.grow(h, 1024).unwrap();
    assert_eq!(heap.bytes(h).unwrap(), &[7, 8]);
}

// ═══════════════════════════════════════════════════════════════════════
// Collection
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_collect_sweeps_only_unreachable_managed_series() {
    let mut heap = Heap::new();
    let rooted = heap.alloc_array(2);
    let stray = heap.alloc_array(2);
    let pinned = heap.alloc_bytes(0);
    let manual = heap.alloc_bytes_unmanaged(0);

    heap.push_hold(pinned);
    let swept = heap.collect(&[rooted]);

    assert_eq!(swept, 1);
    assert!(heap.is_live(rooted));
    assert!(!heap.is_live(stray));
    assert!(heap.is_live(pinned), "held series must survive");
    assert!(heap.is_live(manual), "unmanaged series ignore the sweep");

    heap.drop_hold(pinned);
    assert_eq!(heap.collect(&[rooted]), 1);
    assert!(!heap.is_live(pinned));
}

#[test]
fn test_reachability_flows_through_cells() {
    let mut heap = Heap::new();
    let child = heap.alloc_array(1);
    let text = heap.alloc_text("leaf");
    heap.array_mut(child)
        .unwrap()
        .push(Cell::series_at(Kind::Text, text, 0))
        .unwrap();

    let root = heap.alloc_array(1);
    heap.array_mut(root)
        .unwrap()
        .push(Cell::series_at(Kind::Block, child, 0))
        .unwrap();

    heap.collect(&[root]);
    assert!(heap.is_live(child));
    assert!(heap.is_live(text));
    assert_eq!(heap.text(text).unwrap(), "leaf");
}

#[test]
fn test_word_bindings_root_their_context() {
    let mut heap = Heap::new();
    let symbols = SymbolTable::new();
    let ctx = ContextHandle::make(&mut heap, ContextFlavor::Object, 2).unwrap();
    ctx.append(&mut heap, symbols.intern("x")).unwrap();

    let block = scan(&mut heap, &symbols, b"x", None).unwrap();
    ctx.bind_existing(&mut heap, block).unwrap();

    heap.collect(&[block]);
    assert!(heap.is_live(ctx.varlist()), "binding must keep its context");
}

#[test]
fn test_collect_threshold_drives_should_collect() {
    let mut heap = Heap::with_collect_threshold(3);
    assert!(!heap.should_collect());
    let keep: Vec<SeriesHandle> = (0..3).map(|_| heap.alloc_array(0)).collect();
    assert!(heap.should_collect());

    heap.collect(&keep);
    assert!(!heap.should_collect());
    assert!(keep.iter().all(|h| heap.is_live(*h)));
}

#[test]
fn test_collect_frees_unreachable_tombstones() {
    let mut heap = Heap::new();
    let symbols = SymbolTable::new();
    let mut actions = Actions::new();
    let name = symbols.intern("noop");
    let noop = actions.push(
        Some(name),
        vec![],
        Dispatcher::Native(std::sync::Arc::new(|_, _| Ok(Cell::blank()))),
        None,
    );
    let keylist = || {
        std::sync::Arc::new(Keylist::from_keys(
            ContextFlavor::Frame,
            [symbols.intern("value")],
        ))
    };

    // One expired frame stays referenced from a rooted array, one is
    // referenced by nothing.
    let kept = ContextHandle::make_frame(&mut heap, noop, keylist()).unwrap();
    heap.expire_frame(kept.varlist(), Cell::frame(kept, noop), Some(symbols.spelling(name)))
        .unwrap();
    let root = heap.alloc_array(1);
    heap.array_mut(root)
        .unwrap()
        .push(Cell::frame(kept, noop))
        .unwrap();

    let stray = ContextHandle::make_frame(&mut heap, noop, keylist()).unwrap();
    heap.expire_frame(stray.varlist(), Cell::frame(stray, noop), Some(symbols.spelling(name)))
        .unwrap();

    let swept = heap.collect(&[root]);
    assert_eq!(swept, 1, "only the unreferenced tombstone goes");

    assert!(heap.expired_archetype(kept.varlist()).is_some());
    assert!(heap.expired_archetype(stray.varlist()).is_none());
    match kept.get_var(&heap, 0) {
        Err(CoreError::FrameExpired { action }) => {
            assert_eq!(action.as_deref(), Some("noop"));
        }
        other => panic!("expected expired frame, got {:?}", other),
    }
    assert!(matches!(
        stray.get_var(&heap, 0),
        Err(CoreError::SeriesFreed)
    ));
}

// ═══════════════════════════════════════════════════════════════════════
// Freezing and deep copies
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_frozen_series_are_read_only() {
    let mut heap = Heap::new();
    let h = heap.adopt_bytes(vec![1, 2]);
    heap.freeze(h).unwrap();

    assert!(heap.is_frozen(h).unwrap());
    assert_eq!(heap.bytes(h).unwrap(), &[1, 2]);
    assert!(matches!(
        heap.bytes_mut(h),
        Err(CoreError::ProtectedSeries { .. })
    ));
}

#[test]
fn test_deep_copy_duplicates_mutable_shares_frozen() {
    let mut heap = Heap::new();
    let mutable = heap.alloc_text("warm");
    let frozen = heap.alloc_text("cold");
    heap.freeze(frozen).unwrap();

    let root = heap.alloc_array(2);
    heap.array_mut(root)
        .unwrap()
        .push(Cell::series_at(Kind::Text, mutable, 0))
        .unwrap();
    heap.array_mut(root)
        .unwrap()
        .push(Cell::series_at(Kind::Text, frozen, 0))
        .unwrap();

    let copy = heap.copy_array_deep(root).unwrap();
    assert_ne!(copy, root);
    let cells = heap.array(copy).unwrap().cells().to_vec();
    let (warm_copy, _) = cells[0].series_ref().unwrap();
    let (cold_copy, _) = cells[1].series_ref().unwrap();

    assert_ne!(warm_copy, mutable, "mutable content is duplicated");
    assert_eq!(cold_copy, frozen, "frozen content stays shared");
    assert_eq!(heap.text(warm_copy).unwrap(), "warm");

    heap.bytes_mut(warm_copy).unwrap().clear();
    assert_eq!(heap.text(mutable).unwrap(), "warm");
}

#[test]
fn test_deep_copy_terminates_on_cycles() {
    let mut heap = Heap::new();
    let a = heap.alloc_array(1);
    let b = heap.alloc_array(1);
    heap.array_mut(a)
        .unwrap()
        .push(Cell::series_at(Kind::Block, b, 0))
        .unwrap();
    heap.array_mut(b)
        .unwrap()
        .push(Cell::series_at(Kind::Block, a, 0))
        .unwrap();

    let copy = heap.copy_array_deep(a).unwrap();
    let (b_copy, _) = heap.array(copy).unwrap().cells()[0].series_ref().unwrap();
    let (back, _) = heap.array(b_copy).unwrap().cells()[0].series_ref().unwrap();
    assert_eq!(back, copy, "the cycle closes inside the copy");
    assert_ne!(b_copy, b);
}

#[test]
fn test_deep_copy_duplicates_contexts() {
    let mut heap = Heap::new();
    let symbols = SymbolTable::new();
    let ctx = ContextHandle::make(&mut heap, ContextFlavor::Object, 2).unwrap();
    let slot = ctx.append(&mut heap, symbols.intern("n")).unwrap();
    ctx.set_var(&mut heap, slot, Cell::integer(5)).unwrap();

    let root = heap.alloc_array(1);
    heap.array_mut(root)
        .unwrap()
        .push(Cell::object(ctx))
        .unwrap();

    let copy = heap.copy_array_deep(root).unwrap();
    let copied = heap.array(copy).unwrap().cells()[0]
        .context_ref()
        .unwrap();

    // A fresh varlist sharing the source keylist, with the archetype
    // rewired onto itself.
    assert_ne!(copied.varlist(), ctx.varlist());
    assert_eq!(copied.get_var(&heap, slot).unwrap().as_int(), Some(5));
    assert!(std::sync::Arc::ptr_eq(
        &ctx.keys(&heap).unwrap(),
        &copied.keys(&heap).unwrap()
    ));
    let archetype = copied.archetype(&heap).unwrap();
    assert_eq!(
        archetype.context_ref().unwrap().varlist(),
        copied.varlist()
    );

    // Writes through the copy leave the original untouched.
    copied.set_var(&mut heap, slot, Cell::integer(99)).unwrap();
    assert_eq!(ctx.get_var(&heap, slot).unwrap().as_int(), Some(5));
}

// ═══════════════════════════════════════════════════════════════════════
// Isotope barrier
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_isotope_barrier_covers_every_kind() {
    let mut heap = Heap::new();
    let symbols = SymbolTable::new();
    let mut actions = Actions::new();

    let text = heap.alloc_text("t");
    let bytes = heap.adopt_bytes(vec![1]);
    let inner = heap.alloc_array(0);
    let ctx = ContextHandle::make(&mut heap, ContextFlavor::Object, 1).unwrap();
    let noop = actions.push(
        Some(symbols.intern("noop")),
        vec![],
        Dispatcher::Native(std::sync::Arc::new(|_, _| Ok(Cell::blank()))),
        None,
    );

    let samples = [
        Cell::blank(),
        Cell::integer(1),
        Cell::rune("r").unwrap(),
        Cell::word(symbols.intern("w")),
        Cell::set_word(symbols.intern("s")),
        Cell::get_word(symbols.intern("g")),
        Cell::text(text),
        Cell::binary(bytes),
        Cell::block(inner),
        Cell::group(inner),
        Cell::path(inner),
        Cell::tuple(inner),
        Cell::object(ctx),
        Cell::frame(ctx, noop),
        Cell::action(noop),
    ];
    assert_eq!(samples.len(), KIND_COUNT);

    let target = heap.alloc_array(samples.len());
    for sample in samples {
        let kind = sample.kind();
        let err = heap
            .array_mut(target)
            .unwrap()
            .push(sample.isotopic())
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::IllegalIsotopeStorage {
                kind: kind.name().to_string()
            },
            "kind {}",
            kind.name()
        );
    }
    assert!(heap.array(target).unwrap().is_empty());
}
