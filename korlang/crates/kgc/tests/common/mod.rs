//! Test Utilities for the KGC integration suite
//!
//! Every fixture registers the same small set of types:
//! - `node`: 16-byte payload, reference slots at 0 and 8
//! - `leaf`: 8-byte scalar payload
//!
//! Assertions are strict and report the caller's line.

#![allow(dead_code)]

use kgc::{
    CycleReport, GarbageCollector, GcConfig, Generation, KgcError, ObjectRef, TypeId, TypeInfo,
};
use std::sync::Arc;

/// Young generation used by most tests (64KB)
pub const SMALL_YOUNG: usize = 64 * 1024;

/// Old generation used by most tests (256KB)
pub const SMALL_OLD: usize = 256 * 1024;

/// ============================================================================
/// GC FIXTURE
/// ============================================================================

/// Test fixture for GC operations
pub struct GcFixture {
    pub gc: Arc<GarbageCollector>,
    pub config: GcConfig,
    pub node: TypeId,
    pub leaf: TypeId,
}

impl GcFixture {
    /// Small heap, default policy
    pub fn with_defaults() -> Self {
        Self::with_config(GcConfig {
            young_capacity: SMALL_YOUNG,
            old_capacity: SMALL_OLD,
            ..Default::default()
        })
    }

    pub fn with_config(config: GcConfig) -> Self {
        let gc = Arc::new(
            GarbageCollector::new(config.clone())
                .expect("GC initialization should succeed with valid config"),
        );
        let node = gc
            .register_type(TypeInfo::new("node", 16).with_refs(&[0, 8]))
            .expect("node type registers");
        let leaf = gc
            .register_type(TypeInfo::new("leaf", 8))
            .expect("leaf type registers");
        Self {
            gc,
            config,
            node,
            leaf,
        }
    }

    pub fn register(&self, info: TypeInfo) -> TypeId {
        self.gc.register_type(info).expect("type registers")
    }

    #[track_caller]
    pub fn alloc(&self, type_id: TypeId) -> ObjectRef {
        self.gc
            .allocate_type(type_id)
            .expect("allocation should succeed")
    }

    #[track_caller]
    pub fn node(&self) -> ObjectRef {
        self.alloc(self.node)
    }

    #[track_caller]
    pub fn leaf(&self) -> ObjectRef {
        self.alloc(self.leaf)
    }

    /// Store `to` into slot `slot` (0 or 1) of a node
    #[track_caller]
    pub fn link(&self, from: ObjectRef, slot: usize, to: ObjectRef) {
        self.gc
            .write_ref(from, slot * 8, Some(to))
            .expect("reference store should succeed");
    }

    #[track_caller]
    pub fn child(&self, from: ObjectRef, slot: usize) -> Option<ObjectRef> {
        self.gc
            .read_ref(from, slot * 8)
            .expect("reference load should succeed")
    }

    #[track_caller]
    pub fn minor(&self, roots: &mut Vec<ObjectRef>) -> CycleReport {
        self.gc.collect_minor(roots).expect("minor cycle should succeed")
    }

    #[track_caller]
    pub fn major(&self, roots: &mut Vec<ObjectRef>) -> CycleReport {
        self.gc.collect_major(roots).expect("major cycle should succeed")
    }

    /// Run minor cycles until `roots[index]` reaches the old generation
    #[track_caller]
    pub fn promote(&self, roots: &mut Vec<ObjectRef>, index: usize) {
        for _ in 0..=self.config.promotion_threshold {
            self.minor(roots);
        }
        assert_generation(&self.gc, roots[index], Generation::Old);
    }
}

/// ============================================================================
/// ASSERTIONS
/// ============================================================================

#[track_caller]
pub fn assert_live(gc: &GarbageCollector, obj: ObjectRef) {
    assert!(gc.is_live(obj), "{:?} should be live", obj);
}

#[track_caller]
pub fn assert_reclaimed(gc: &GarbageCollector, obj: ObjectRef) {
    assert!(!gc.is_live(obj), "{:?} should have been reclaimed", obj);
}

#[track_caller]
pub fn assert_generation(gc: &GarbageCollector, obj: ObjectRef, expected: Generation) {
    let info = gc.inspect(obj).expect("object should be live");
    assert_eq!(
        info.generation, expected,
        "{:?} is in the {} generation",
        obj, info.generation
    );
}

#[track_caller]
pub fn assert_invalid_handle(result: kgc::Result<impl std::fmt::Debug>, obj: ObjectRef) {
    match result {
        Err(KgcError::InvalidHandle { address }) => assert_eq!(address, obj.addr()),
        other => panic!("expected InvalidHandle for {:?}, got {:?}", obj, other),
    }
}
