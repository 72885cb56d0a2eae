//! Generational GC Tests
//!
//! Promotion, the remembered set, major collection with compaction and
//! allocation-triggered collection.

mod common;

use common::{assert_generation, assert_live, assert_reclaimed, GcFixture, SMALL_OLD, SMALL_YOUNG};
use kgc::heap::AdaptiveConfig;
use kgc::logging::GcEvent;
use kgc::{GcConfig, Generation, KgcError, ShadowStack};

#[test]
fn test_promotion_on_second_survival() {
    let fixture = GcFixture::with_defaults();
    let obj = fixture.node();
    let mut roots = vec![obj];

    let first = fixture.minor(&mut roots);
    assert_eq!(first.promoted_objects, 0);
    assert_eq!(roots[0], obj);
    let info = fixture.gc.inspect(obj).unwrap();
    assert_eq!(info.generation, Generation::Young);
    assert_eq!(info.age, 1);

    let second = fixture.minor(&mut roots);
    assert_eq!(second.promoted_objects, 1);
    assert_ne!(roots[0], obj);
    assert_reclaimed(&fixture.gc, obj);
    let info = fixture.gc.inspect(roots[0]).unwrap();
    assert_eq!(info.generation, Generation::Old);
    assert_eq!(info.age, 0);
}

#[test]
fn test_old_objects_stay_put_across_minors() {
    let fixture = GcFixture::with_defaults();
    let mut roots = vec![fixture.node()];
    fixture.promote(&mut roots, 0);
    let promoted = roots[0];

    for _ in 0..4 {
        let report = fixture.minor(&mut roots);
        assert_eq!(report.promoted_objects, 0);
    }
    assert_eq!(roots[0], promoted);
    assert_generation(&fixture.gc, promoted, Generation::Old);
}

#[test]
fn test_promotion_rewrites_references() {
    let fixture = GcFixture::with_defaults();
    let parent = fixture.node();
    let child = fixture.node();
    fixture.link(parent, 0, child);
    fixture.link(child, 1, parent);

    let mut roots = vec![parent];
    fixture.promote(&mut roots, 0);

    let parent = roots[0];
    let child = fixture.child(parent, 0).expect("child survives");
    assert_generation(&fixture.gc, child, Generation::Old);
    assert_eq!(fixture.child(child, 1), Some(parent));
    fixture.gc.verify_heap().unwrap();
}

#[test]
fn test_old_to_young_store_is_remembered() {
    let fixture = GcFixture::with_defaults();
    let mut roots = vec![fixture.node()];
    fixture.promote(&mut roots, 0);
    let old = roots[0];

    let young = fixture.node();
    fixture.link(old, 0, young);
    assert!(fixture.gc.inspect(old).unwrap().remembered);
    assert_eq!(fixture.gc.barrier_stats().remembered, 1);

    // `old` is not a root: only the remembered set keeps `young` alive
    fixture.minor(&mut Vec::new());
    assert_live(&fixture.gc, young);
    assert!(fixture.gc.inspect(old).unwrap().remembered);

    // Once `young` is promoted the holder no longer needs remembering
    fixture.minor(&mut Vec::new());
    assert_reclaimed(&fixture.gc, young);
    let moved = fixture.child(old, 0).expect("slot rewritten");
    assert_generation(&fixture.gc, moved, Generation::Old);
    assert!(!fixture.gc.inspect(old).unwrap().remembered);
}

#[test]
fn test_young_to_old_store_is_not_remembered() {
    let fixture = GcFixture::with_defaults();
    let mut roots = vec![fixture.node()];
    fixture.promote(&mut roots, 0);

    let young = fixture.node();
    fixture.link(young, 0, roots[0]);

    let stats = fixture.gc.barrier_stats();
    assert_eq!(stats.stores, 1);
    assert_eq!(stats.remembered, 0);
    assert!(!fixture.gc.inspect(young).unwrap().remembered);
}

#[test]
fn test_minor_leaves_old_garbage() {
    let fixture = GcFixture::with_defaults();
    let mut roots = vec![fixture.node()];
    fixture.promote(&mut roots, 0);
    let old = roots.pop().unwrap();

    fixture.minor(&mut roots);
    assert_live(&fixture.gc, old);

    let report = fixture.major(&mut roots);
    assert_eq!(report.reclaimed_objects, 1);
    assert_reclaimed(&fixture.gc, old);
    assert_eq!(fixture.gc.object_count(), 0);
}

#[test]
fn test_major_collects_young_without_aging() {
    let fixture = GcFixture::with_defaults();
    let kept = fixture.node();
    let garbage = fixture.leaf();

    let report = fixture.major(&mut vec![kept]);

    assert_eq!(report.reclaimed_objects, 1);
    assert_eq!(report.promoted_objects, 0);
    assert_reclaimed(&fixture.gc, garbage);
    let info = fixture.gc.inspect(kept).unwrap();
    assert_eq!(info.generation, Generation::Young);
    assert_eq!(info.age, 0);
}

#[test]
fn test_major_compaction_slides_survivors() {
    let fixture = GcFixture::with_defaults();
    let x = fixture.node();
    let y = fixture.node();
    let z = fixture.node();
    fixture.link(x, 0, z);

    let mut roots = vec![x, y, z];
    fixture.promote(&mut roots, 2);
    let (x, y, z) = (roots[0], roots[1], roots[2]);
    assert_eq!(z.addr() - y.addr(), y.addr() - x.addr());

    roots.remove(1);
    let report = fixture.major(&mut roots);

    assert_eq!(report.reclaimed_objects, 1);
    assert_eq!(report.compacted_objects, 1);
    assert_eq!(roots, vec![x, y]);
    assert_eq!(fixture.child(x, 0), Some(y));
    assert!(!fixture.gc.is_live(z));
    fixture.gc.verify_heap().unwrap();
}

#[test]
fn test_major_without_compaction_keeps_addresses() {
    let fixture = GcFixture::with_config(GcConfig {
        young_capacity: SMALL_YOUNG,
        old_capacity: SMALL_OLD,
        compact_old: false,
        ..Default::default()
    });
    let mut roots = vec![fixture.node(), fixture.node(), fixture.node()];
    fixture.promote(&mut roots, 2);
    let survivor = roots[2];

    roots.remove(1);
    let report = fixture.major(&mut roots);

    assert_eq!(report.compacted_objects, 0);
    assert_eq!(roots[1], survivor);
}

#[test]
fn test_watermark_triggers_minor_with_provider() {
    let fixture = GcFixture::with_config(GcConfig {
        young_capacity: SMALL_YOUNG,
        old_capacity: SMALL_OLD,
        minor_watermark: 0.5,
        ..Default::default()
    });
    let stack = ShadowStack::new();
    fixture.gc.set_root_provider(stack.clone());
    let slot = stack.push(fixture.leaf());

    for _ in 0..2000 {
        fixture.leaf();
    }

    assert!(fixture.gc.cycle_count() >= 2);
    let summary = fixture.gc.stats().summary();
    assert_eq!(summary.major_cycles, 0);
    assert_eq!(summary.minor_cycles, fixture.gc.cycle_count());

    let kept = stack.get(slot).expect("slot still present");
    assert_generation(&fixture.gc, kept, Generation::Old);
}

#[test]
fn test_allocation_without_provider_reports_oom() {
    let fixture = GcFixture::with_defaults();

    let mut allocated = 0;
    let err = loop {
        match fixture.gc.allocate_type(fixture.leaf) {
            Ok(_) => allocated += 1,
            Err(e) => break e,
        }
        assert!(allocated < 100_000, "young generation never filled");
    };

    match &err {
        KgcError::OutOfMemory {
            requested,
            available,
        } => {
            assert_eq!(*requested, kgc::HEADER_SIZE + 8);
            assert!(available < requested);
        },
        other => panic!("expected OutOfMemory, got {:?}", other),
    }
    assert!(err.is_recoverable());
    assert_eq!(fixture.gc.cycle_count(), 0);

    // Collecting explicitly frees the whole generation
    let report = fixture.minor(&mut Vec::new());
    assert_eq!(report.reclaimed_objects, allocated);
    fixture.leaf();
}

#[test]
fn test_full_young_generation_collects_with_provider() {
    let fixture = GcFixture::with_config(GcConfig {
        young_capacity: SMALL_YOUNG,
        old_capacity: SMALL_OLD,
        minor_watermark: 1.0,
        ..Default::default()
    });
    let stack = ShadowStack::new();
    fixture.gc.set_root_provider(stack.clone());

    for _ in 0..5000 {
        fixture.leaf();
    }

    assert!(fixture.gc.cycle_count() >= 1);
    assert!(fixture.gc.stats().summary().objects_reclaimed > 0);
}

fn survivor_heavy_config(adaptive: AdaptiveConfig) -> GcConfig {
    GcConfig {
        young_capacity: SMALL_YOUNG,
        old_capacity: SMALL_OLD,
        minor_watermark: 0.25,
        // Survivors stay young so they count against the trigger
        promotion_threshold: 100,
        adaptive,
        ..Default::default()
    }
}

#[test]
fn test_minor_trigger_grows_with_young_survivors() {
    let fixture = GcFixture::with_config(survivor_heavy_config(AdaptiveConfig::default()));
    let floor = SMALL_YOUNG / 4;
    assert_eq!(fixture.gc.minor_trigger_bytes(), floor);

    let stack = ShadowStack::new();
    fixture.gc.set_root_provider(stack.clone());
    for _ in 0..1000 {
        stack.push(fixture.leaf());
    }

    // Every cycle found the young generation crowded with live leaves
    let grown = fixture.gc.minor_trigger_bytes();
    assert!(fixture.gc.cycle_count() >= 2);
    assert!(grown > floor, "trigger stayed at {}", grown);
    assert!(grown <= SMALL_YOUNG);
    assert_eq!(fixture.gc.object_count(), 1000);

    let grow_events = fixture
        .gc
        .logger()
        .get_events()
        .into_iter()
        .filter(|(_, e)| matches!(e, GcEvent::TriggerAdjusted { change, .. } if change == "grow"))
        .count();
    assert_eq!(grow_events as u64, fixture.gc.cycle_count());
    assert_eq!(
        fixture.gc.diagnostics()["trigger_adjustments"],
        fixture.gc.cycle_count().to_string()
    );

    // Once the leaves die the trigger relaxes toward the watermark
    stack.truncate(0);
    fixture.minor(&mut Vec::new());
    let relaxed = fixture.gc.minor_trigger_bytes();
    assert!(relaxed < grown);
    assert!(relaxed >= floor);
    assert_eq!(fixture.gc.object_count(), 0);
}

#[test]
fn test_fixed_minor_trigger_when_adaptive_disabled() {
    let fixture = GcFixture::with_config(survivor_heavy_config(AdaptiveConfig {
        enabled: false,
        ..Default::default()
    }));
    let stack = ShadowStack::new();
    fixture.gc.set_root_provider(stack.clone());
    for _ in 0..1000 {
        stack.push(fixture.leaf());
    }

    assert!(fixture.gc.cycle_count() >= 2);
    assert_eq!(fixture.gc.minor_trigger_bytes(), SMALL_YOUNG / 4);
    assert_eq!(fixture.gc.diagnostics()["trigger_adjustments"], "0");
}
