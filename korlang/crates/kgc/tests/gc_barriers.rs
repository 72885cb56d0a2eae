//! Incremental Marking & Write Barrier Tests

mod common;

use common::{assert_live, assert_reclaimed, GcFixture};
use kgc::{CycleKind, GcReason, GcState, KgcError};

#[test]
fn test_incremental_major_basic() {
    let fixture = GcFixture::with_defaults();
    let a = fixture.node();
    let b = fixture.node();
    let garbage = fixture.leaf();
    fixture.link(a, 0, b);

    let mut roots = vec![a];
    fixture.gc.start_incremental_major(&mut roots).unwrap();
    assert_eq!(fixture.gc.state(), GcState::Marking);

    let mut steps = 0;
    while !fixture.gc.incremental_mark_step(1).unwrap() {
        steps += 1;
        assert!(steps < 100);
    }

    let report = fixture.gc.finish_incremental_major(&mut roots).unwrap();
    assert_eq!(report.kind, CycleKind::Major);
    assert_eq!(report.reason, GcReason::Incremental);
    assert_eq!(report.reclaimed_objects, 1);
    assert_eq!(fixture.gc.state(), GcState::Idle);
    assert_live(&fixture.gc, b);
    assert_reclaimed(&fixture.gc, garbage);
}

#[test]
fn test_insertion_barrier_shades_stored_target() {
    let fixture = GcFixture::with_defaults();
    let a = fixture.node();
    let b = fixture.node();

    let mut roots = vec![a];
    fixture.gc.start_incremental_major(&mut roots).unwrap();
    fixture.gc.incremental_mark_step(1).unwrap();
    assert!(fixture.gc.inspect(a).unwrap().marked);
    assert!(!fixture.gc.inspect(b).unwrap().marked);

    // Black `a` now points at white `b`
    fixture.link(a, 0, b);
    assert_eq!(fixture.gc.barrier_stats().shaded, 1);

    let report = fixture.gc.finish_incremental_major(&mut roots).unwrap();
    assert_eq!(report.reclaimed_objects, 0);
    assert_live(&fixture.gc, b);
    assert_eq!(fixture.child(a, 0), Some(b));
}

#[test]
fn test_store_into_unmarked_holder_is_not_shaded() {
    let fixture = GcFixture::with_defaults();
    let a = fixture.node();
    let b = fixture.node();

    fixture.gc.start_incremental_major(&mut vec![a]).unwrap();
    fixture.link(a, 0, b);
    assert_eq!(fixture.gc.barrier_stats().shaded, 0);

    // `a` is still grey, so tracing it finds `b`
    fixture.gc.finish_incremental_major(&mut vec![a]).unwrap();
    assert_live(&fixture.gc, b);
}

#[test]
fn test_allocation_during_marking_is_black() {
    let fixture = GcFixture::with_defaults();
    fixture.gc.start_incremental_major(&mut Vec::new()).unwrap();

    let fresh = fixture.node();
    assert!(fixture.gc.inspect(fresh).unwrap().marked);

    fixture.gc.finish_incremental_major(&mut Vec::new()).unwrap();
    assert_live(&fixture.gc, fresh);
    assert!(!fixture.gc.inspect(fresh).unwrap().marked);

    // An ordinary cycle afterwards treats it as garbage
    fixture.major(&mut Vec::new());
    assert_reclaimed(&fixture.gc, fresh);
}

#[test]
fn test_minor_during_marking_finishes_major() {
    let fixture = GcFixture::with_defaults();
    let kept = fixture.node();
    let garbage = fixture.node();

    fixture.gc.start_incremental_major(&mut vec![kept]).unwrap();
    let report = fixture.minor(&mut vec![kept]);

    assert_eq!(report.kind, CycleKind::Major);
    assert_eq!(report.reason, GcReason::Incremental);
    assert_eq!(fixture.gc.state(), GcState::Idle);
    assert_reclaimed(&fixture.gc, garbage);
    assert_eq!(fixture.gc.inspect(kept).unwrap().age, 0);
}

#[test]
fn test_trace_rejected_while_marking() {
    let fixture = GcFixture::with_defaults();
    fixture.gc.start_incremental_major(&mut Vec::new()).unwrap();

    assert!(matches!(
        fixture.gc.trace(&mut Vec::new()),
        Err(KgcError::InvalidState { .. })
    ));
    assert!(matches!(
        fixture.gc.start_incremental_major(&mut Vec::new()),
        Err(KgcError::InvalidState { .. })
    ));
    fixture.gc.finish_incremental_major(&mut Vec::new()).unwrap();
}

#[test]
fn test_finish_without_start_is_rejected() {
    let fixture = GcFixture::with_defaults();
    assert!(matches!(
        fixture.gc.finish_incremental_major(&mut Vec::new()),
        Err(KgcError::InvalidState { .. })
    ));
    assert_eq!(fixture.gc.cycle_count(), 0);
}

#[test]
fn test_barrier_counters() {
    let fixture = GcFixture::with_defaults();
    let mut roots = vec![fixture.node()];
    fixture.promote(&mut roots, 0);
    let old = roots[0];

    let young = fixture.node();
    fixture.gc.write_ref(young, 0, None).unwrap();
    fixture.link(young, 1, old);
    fixture.link(old, 0, young);
    fixture.link(old, 1, young);

    let stats = fixture.gc.barrier_stats();
    assert_eq!(stats.stores, 4);
    // The second old-to-young store finds `old` already remembered
    assert_eq!(stats.remembered, 1);
    assert_eq!(stats.shaded, 0);
    assert_eq!(fixture.gc.diagnostics()["barrier_stores"], "4");
}
