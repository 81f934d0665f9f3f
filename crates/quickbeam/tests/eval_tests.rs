use std::sync::Arc;

use quickbeam::*;

// ═══════════════════════════════════════════════════════════════════════
// Expressions
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_last_expression_wins() {
    let mut engine = Engine::new();
    assert_eq!(engine.run("1 2 3").unwrap().as_int(), Some(3));
}

#[test]
fn test_assignment_defines_and_returns() {
    let mut engine = Engine::new();
    assert_eq!(engine.run("x: 42").unwrap().as_int(), Some(42));
    assert_eq!(engine.run("x").unwrap().as_int(), Some(42));
    assert_eq!(engine.run("x: y: 9 x").unwrap().as_int(), Some(9));
    assert_eq!(engine.run("y").unwrap().as_int(), Some(9));
}

#[test]
fn test_groups_evaluate_inline() {
    let mut engine = Engine::new();
    assert_eq!(engine.run("(1 2)").unwrap().as_int(), Some(2));
    assert_eq!(engine.run("b: [1 (2)] first b").unwrap().as_int(), Some(1));
    let inner = engine.run("pick b 2").unwrap();
    assert_eq!(inner.kind(), Kind::Group);
}

#[test]
fn test_redefinition_overwrites_in_place() {
    let mut engine = Engine::new();
    engine.run("x: 1").unwrap();
    let before = engine.lookup(engine.lib(), "x", Case::Insensitive).unwrap();
    engine.run("x: 2").unwrap();
    let after = engine.lookup(engine.lib(), "x", Case::Insensitive).unwrap();
    assert_eq!(before, after);
    assert_eq!(engine.run("x").unwrap().as_int(), Some(2));
}

#[test]
fn test_words_are_case_insensitive() {
    let mut engine = Engine::new();
    engine.run("Total: 10").unwrap();
    assert_eq!(engine.run("total").unwrap().as_int(), Some(10));
    assert_eq!(engine.run("TOTAL").unwrap().as_int(), Some(10));
}

// ═══════════════════════════════════════════════════════════════════════
// Actions from scripts
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_does_bodies_see_lib() {
    let mut engine = Engine::new();
    engine.run("count: [] tick: does [append count 1]").unwrap();
    engine.run("tick tick tick").unwrap();
    assert_eq!(engine.run("length-of count").unwrap().as_int(), Some(3));
}

#[test]
fn test_does_body_runs_from_a_fresh_copy_each_call() {
    let mut engine = Engine::new();
    engine.run("make-one: does [p: [] append p 1]").unwrap();
    assert_eq!(engine.run("length-of make-one").unwrap().as_int(), Some(1));
    assert_eq!(engine.run("length-of make-one").unwrap().as_int(), Some(1));
}

#[test]
fn test_action_values_invoke_when_fetched_by_word() {
    let mut engine = Engine::new();
    engine.run("f: does [7]").unwrap();
    assert_eq!(engine.run("f").unwrap().as_int(), Some(7));
    assert_eq!(engine.run(":f").unwrap().kind(), Kind::Action);
    assert_eq!(engine.run("g: :f g").unwrap().as_int(), Some(7));
}

// ═══════════════════════════════════════════════════════════════════════
// Paths and tuples
// ═══════════════════════════════════════════════════════════════════════

fn engine_with_plant() -> Engine {
    let mut engine = Engine::new();
    let leaf = ContextHandle::make(engine.heap_mut(), ContextFlavor::Object, 4).unwrap();
    engine.set_var(leaf, "vein", Cell::integer(7)).unwrap();
    let plant = ContextHandle::make(engine.heap_mut(), ContextFlavor::Object, 4).unwrap();
    engine.set_var(plant, "leaf", Cell::object(leaf)).unwrap();
    engine.set_var(plant, "name", Cell::integer(1)).unwrap();
    engine.define("plant", Cell::object(plant)).unwrap();
    engine
}

#[test]
fn test_path_walks_objects_and_series() {
    let mut engine = engine_with_plant();
    assert_eq!(engine.run("plant/name").unwrap().as_int(), Some(1));
    assert_eq!(engine.run("plant.leaf/vein").unwrap().as_int(), Some(7));
    let row = engine.run("rows: [[1 2] [3 4]] rows/2").unwrap();
    assert_eq!(row.kind(), Kind::Block);
}

#[test]
fn test_path_absent_field_errors() {
    let mut engine = engine_with_plant();
    assert!(matches!(
        engine.run("plant/stem"),
        Err(CoreError::NameNotBound { name }) if name == "stem"
    ));
}

#[test]
fn test_path_on_non_container_reports_pick_miss() {
    let mut engine = Engine::new();
    engine.run("n: 5").unwrap();
    match engine.run("n/1") {
        Err(CoreError::NoHandlerForType { verb, kind }) => {
            assert_eq!(verb, "pick");
            assert_eq!(kind, "integer!");
        }
        other => panic!("expected pick miss, got {:?}", other),
    }
}

#[test]
fn test_bare_tuples_are_inert() {
    let mut engine = engine_with_plant();
    assert_eq!(engine.run("plant.leaf").unwrap().kind(), Kind::Tuple);
}

#[test]
fn test_path_does_not_invoke_a_final_action() {
    let mut engine = engine_with_plant();
    engine.run("fs: [] f: does [3] append fs :f").unwrap();
    assert_eq!(engine.run("fs/1").unwrap().kind(), Kind::Action);
}

// ═══════════════════════════════════════════════════════════════════════
// Isotopes in flow
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_isotopes_live_in_variables_but_decay_on_fetch() {
    let mut engine = Engine::new();
    let stored = engine.run("x: ~gone~").unwrap();
    assert!(stored.is_isotope());

    let fetched = engine.run("x").unwrap();
    assert!(!fetched.is_isotope());
    assert_eq!(fetched.kind(), Kind::Word);

    let lib = engine.lib();
    let index = engine.lookup(lib, "x", Case::Insensitive).unwrap().unwrap();
    let lifted = lib.get_var_lifted(engine.heap(), index).unwrap();
    assert!(lifted.is_isotope());
}

#[test]
fn test_isotopes_cannot_enter_blocks() {
    let mut engine = Engine::new();
    assert!(matches!(
        engine.run("b: [] append b ~bad~"),
        Err(CoreError::IllegalIsotopeStorage { .. })
    ));
}

#[test]
fn test_reify_round_trips_an_isotope_through_a_block() {
    let mut engine = Engine::new();
    engine.run("b: [] append b reify ~sig~").unwrap();
    let stored = engine.run("first b").unwrap();
    assert!(stored.is_quasi());
    assert!(!stored.is_isotope());
}

#[test]
fn test_blackhole_is_truthy_blank_is_not() {
    let mut engine = Engine::new();
    let hole = engine.run("#").unwrap();
    assert!(hole.is_blackhole());
    assert!(hole.is_truthy());
    let blank = engine.run("_").unwrap();
    assert!(!blank.is_truthy());
}

// ═══════════════════════════════════════════════════════════════════════
// Collection during evaluation
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_explicit_collect_native_leaves_script_data_alone() {
    let mut engine = Engine::new();
    engine
        .register_native(
            "recycle",
            "[]",
            Arc::new(|engine: &mut Engine, _frame: ContextHandle| {
                Ok(Cell::integer(engine.collect() as i64))
            }),
        )
        .unwrap();
    let result = engine
        .run("keep: [1 2 3] recycle append keep 4 length-of keep")
        .unwrap();
    assert_eq!(result.as_int(), Some(4));
}

#[test]
fn test_scan_errors_surface_through_run() {
    let mut engine = Engine::new();
    match engine.run("[1 2") {
        Err(CoreError::Scan(err)) => assert!(err.is_incomplete()),
        other => panic!("expected scan error, got {:?}", other),
    }
}
