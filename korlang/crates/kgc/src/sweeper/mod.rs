//! Sweeper Module - reclaiming unmarked objects
//!
//! Runs after tracing, finalizer discovery and (in minor cycles) promotion.
//! An unmarked object is freed unless it is:
//! - pinned (skipped, nothing cleared)
//! - held by the finalizer queue (Queued or Finalizing)
//! - finalizable and not yet finalized
//!
//! Off-heap shells hand their handle back through [`Sweep::detached_off_heap`]
//! so the owner can release the external storage.

use crate::bridge::{self, OffHeapHandle};
use crate::error::{KgcError, Result};
use crate::heap::Space;
use crate::object::{header_of, ObjectRef, TypeTable};
use crate::runtime::{FinalizerQueue, FinalizerState};

/// Result of sweeping one space
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Sweep {
    pub reclaimed_objects: usize,
    pub reclaimed_bytes: usize,
    pub detached_off_heap: Vec<OffHeapHandle>,
}

impl Sweep {
    pub fn merge(&mut self, other: Sweep) {
        self.reclaimed_objects += other.reclaimed_objects;
        self.reclaimed_bytes += other.reclaimed_bytes;
        self.detached_off_heap.extend(other.detached_off_heap);
    }
}

/// Free every reclaimable object in `space`
pub fn sweep_space(
    space: &mut Space,
    types: &TypeTable,
    finalizers: &mut FinalizerQueue,
) -> Result<Sweep> {
    let mut sweep = Sweep::default();

    for addr in space.objects() {
        let Some(obj) = ObjectRef::from_addr(addr) else {
            continue;
        };
        // SAFETY: `addr` comes from the space index.
        let header = unsafe { header_of(obj) };
        if header.is_marked() || header.is_pinned() {
            continue;
        }
        let finalizable = header.has_finalizer();
        if finalizable && finalizers.state(obj) != FinalizerState::Reclaimable {
            continue;
        }

        let mode = types
            .get(header.type_id())
            .map_err(|_| KgcError::corrupt(addr, "unregistered type"))?
            .aux_mode;
        if let Some(handle) = bridge::detached_handle(header, mode) {
            sweep.detached_off_heap.push(handle);
        }

        sweep.reclaimed_bytes += space.free(addr)?;
        sweep.reclaimed_objects += 1;
        if finalizable {
            finalizers.forget(obj);
        }
    }

    log::debug!(
        "sweep: {} space freed {} objects ({} bytes)",
        space.generation(),
        sweep.reclaimed_objects,
        sweep.reclaimed_bytes
    );
    Ok(sweep)
}

/// Clear `MARKED` on every object in `space`
pub fn clear_marks(space: &Space) {
    for addr in space.objects() {
        if let Some(obj) = ObjectRef::from_addr(addr) {
            // SAFETY: `addr` comes from the space index.
            unsafe { header_of(obj) }.clear_marked();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{AuxMode, Generation, ObjectHeader, TypeId, TypeInfo};
    use std::sync::atomic::Ordering;

    struct Fixture {
        space: Space,
        types: TypeTable,
        plain: TypeId,
        finalizable: TypeId,
        shell: TypeId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut types = TypeTable::new();
            let plain = types.register(TypeInfo::new("plain", 16)).unwrap();
            let finalizable = types
                .register(TypeInfo::new("file", 16).with_finalizer())
                .unwrap();
            let shell = types
                .register(TypeInfo::new("buffer", 16).with_aux_mode(AuxMode::OffHeap))
                .unwrap();
            Self {
                space: Space::new(Generation::Young, 4096).unwrap(),
                types,
                plain,
                finalizable,
                shell,
            }
        }

        fn alloc(&mut self, id: TypeId) -> ObjectRef {
            let addr = self.space.allocate(ObjectHeader::footprint(16).unwrap()).unwrap();
            let finalizable = self.types.get(id).unwrap().has_finalizer;
            self.space
                .install(addr, ObjectHeader::new(id, 16, finalizable));
            ObjectRef::from_addr(addr).unwrap()
        }

        fn header(&self, obj: ObjectRef) -> &ObjectHeader {
            unsafe { header_of(obj) }
        }
    }

    #[test]
    fn test_sweeps_unmarked_only() {
        let mut f = Fixture::new();
        let live = f.alloc(f.plain);
        let dead = f.alloc(f.plain);
        f.header(live).set_marked();

        let mut queue = FinalizerQueue::new();
        let sweep = sweep_space(&mut f.space, &f.types, &mut queue).unwrap();
        assert_eq!(sweep.reclaimed_objects, 1);
        assert_eq!(sweep.reclaimed_bytes, ObjectHeader::footprint(16).unwrap());
        assert!(f.space.is_object(live.addr()));
        assert!(!f.space.is_object(dead.addr()));
    }

    #[test]
    fn test_pinned_and_unfinalized_survive() {
        let mut f = Fixture::new();
        let pinned = f.alloc(f.plain);
        f.header(pinned).set_pinned(true);
        let pending = f.alloc(f.finalizable);
        let held = f.alloc(f.finalizable);

        let mut queue = FinalizerQueue::new();
        queue.enqueue(held).unwrap();
        let sweep = sweep_space(&mut f.space, &f.types, &mut queue).unwrap();

        assert_eq!(sweep.reclaimed_objects, 0);
        for obj in [pinned, pending, held] {
            assert!(f.space.is_object(obj.addr()));
        }
    }

    #[test]
    fn test_reclaimable_is_freed_and_forgotten() {
        let mut f = Fixture::new();
        let obj = f.alloc(f.finalizable);
        let mut queue = FinalizerQueue::new();
        queue.enqueue(obj).unwrap();
        queue.next();
        queue.complete(obj).unwrap();

        let sweep = sweep_space(&mut f.space, &f.types, &mut queue).unwrap();
        assert_eq!(sweep.reclaimed_objects, 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_off_heap_handle_is_reported() {
        let mut f = Fixture::new();
        let shell = f.alloc(f.shell);
        f.header(shell).aux_cell().store(77, Ordering::Release);
        f.alloc(f.shell);

        let mut queue = FinalizerQueue::new();
        let sweep = sweep_space(&mut f.space, &f.types, &mut queue).unwrap();
        assert_eq!(sweep.reclaimed_objects, 2);
        assert_eq!(sweep.detached_off_heap, vec![OffHeapHandle::new(77).unwrap()]);
    }

    #[test]
    fn test_clear_marks() {
        let mut f = Fixture::new();
        let obj = f.alloc(f.plain);
        f.header(obj).set_marked();
        clear_marks(&f.space);
        assert!(!f.header(obj).is_marked());
    }
}
