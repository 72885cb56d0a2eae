//! Relocate Module - Promotion, Compaction & Reference Rewriting
//!
//! Objects move in two places:
//! - **Promotion**: marked young survivors past the age threshold are copied
//!   into the old generation after a minor trace
//! - **Compaction**: live old objects slide together after a major sweep
//!
//! Each phase fills a [`ForwardingTable`]; once the phase is over every
//! reference on record (roots, reference slots, collector bookkeeping) is
//! rewritten through it. Pinned objects, ARC objects with a nonzero count and
//! finalizer-held objects never move.

pub mod compaction;
pub mod forwarding;

pub use compaction::compact;
pub use forwarding::ForwardingTable;

use crate::bridge;
use crate::error::{KgcError, Result};
use crate::heap::{load_slot, store_slot, Heap};
use crate::marker::RootProvider;
use crate::object::{header_of, ObjectHeader, ObjectRef, TypeTable};
use crate::runtime::FinalizerQueue;

/// True if the collector may move `obj`
pub fn is_movable(
    header: &ObjectHeader,
    obj: ObjectRef,
    types: &TypeTable,
    finalizers: &FinalizerQueue,
) -> bool {
    let retained = types
        .get(header.type_id())
        .map_or(true, |info| bridge::is_retained(header, info.aux_mode));
    !header.is_pinned() && !retained && !finalizers.is_held(obj)
}

/// Result of the promotion phase
#[derive(Debug, Default)]
pub struct Promotion {
    pub forwarding: ForwardingTable,
    pub promoted_bytes: usize,
    /// Survivors past the threshold that stayed young for lack of old space
    pub failures: usize,
}

/// Age every marked young object and move those past `threshold`
///
/// Runs after tracing and before sweeping. Promoted objects keep their mark
/// and leave the young object index.
pub fn promote_survivors(
    heap: &mut Heap,
    types: &TypeTable,
    finalizers: &FinalizerQueue,
    threshold: u16,
) -> Result<Promotion> {
    let mut promotion = Promotion::default();

    for addr in heap.young.objects() {
        let Some(obj) = ObjectRef::from_addr(addr) else {
            continue;
        };
        // SAFETY: `addr` comes from the young index.
        let header = unsafe { header_of(obj) };
        if !header.is_marked() {
            continue;
        }
        if header.increment_age() <= threshold {
            continue;
        }
        if !is_movable(header, obj, types, finalizers) {
            continue;
        }

        let footprint = heap
            .young
            .footprint_of(addr)
            .ok_or_else(|| KgcError::corrupt(addr, "young object missing from index"))?;
        let Some(new_addr) = heap.old.allocate(footprint) else {
            promotion.failures += 1;
            log::warn!(
                "promotion: old generation full, {:?} ({} bytes) stays young",
                obj,
                footprint
            );
            continue;
        };

        // SAFETY: both blocks are `footprint` bytes, distinct, and owned by
        // this object; the old block was just carved.
        unsafe {
            std::ptr::copy_nonoverlapping(addr as *const u8, new_addr as *mut u8, footprint);
        }
        let Some(new_obj) = ObjectRef::from_addr(new_addr) else {
            continue;
        };
        // SAFETY: the old block now holds a copy of a valid header.
        unsafe { header_of(new_obj) }.promote();
        heap.young.free(addr)?;

        promotion.forwarding.record_move(obj, new_obj, footprint);
        promotion.promoted_bytes += footprint;
    }

    Ok(promotion)
}

/// Rewrite every reference slot of `objs` through `forwarding`
pub fn rewrite_slots(
    heap: &Heap,
    types: &TypeTable,
    objs: impl IntoIterator<Item = ObjectRef>,
    forwarding: &ForwardingTable,
) -> Result<()> {
    if forwarding.is_empty() {
        return Ok(());
    }
    for obj in objs {
        let header = heap.header(obj)?;
        let info = types
            .get(header.type_id())
            .map_err(|_| KgcError::corrupt(obj.addr(), "unregistered type"))?;
        for offset in info.refs.iter() {
            // SAFETY: reference offsets were validated against the payload
            // size at allocation.
            unsafe {
                let raw = load_slot(obj, offset);
                let moved = forwarding.resolve_raw(raw);
                if moved != raw {
                    store_slot(obj, offset, moved);
                }
            }
        }
    }
    Ok(())
}

/// Rewrite root slots through `forwarding`
pub fn rewrite_roots(roots: &mut dyn RootProvider, forwarding: &ForwardingTable) {
    if forwarding.is_empty() {
        return;
    }
    roots.visit_roots(&mut |slot| *slot = forwarding.resolve(*slot));
}

/// Every object handle in both generations
pub(crate) fn all_objects(heap: &Heap) -> Vec<ObjectRef> {
    heap.young
        .objects()
        .into_iter()
        .chain(heap.old.objects())
        .filter_map(ObjectRef::from_addr)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::object::{Generation, TypeId, TypeInfo};

    fn setup() -> (Heap, TypeTable, TypeId) {
        let config = GcConfig {
            young_capacity: 4096,
            old_capacity: 4096,
            ..Default::default()
        };
        let mut types = TypeTable::new();
        let id = types
            .register(TypeInfo::new("node", 8).with_refs(&[0]))
            .unwrap();
        (Heap::new(&config).unwrap(), types, id)
    }

    fn alloc(heap: &mut Heap, id: TypeId) -> ObjectRef {
        let addr = heap.young.allocate(ObjectHeader::footprint(8).unwrap()).unwrap();
        heap.young.install(addr, ObjectHeader::new(id, 8, false));
        ObjectRef::from_addr(addr).unwrap()
    }

    #[test]
    fn test_promotion_after_threshold() {
        let (mut heap, types, id) = setup();
        let queue = FinalizerQueue::new();
        let obj = alloc(&mut heap, id);
        heap.header(obj).unwrap().set_marked();

        let first = promote_survivors(&mut heap, &types, &queue, 1).unwrap();
        assert!(first.forwarding.is_empty());
        assert_eq!(heap.header(obj).unwrap().age(), 1);

        let second = promote_survivors(&mut heap, &types, &queue, 1).unwrap();
        let moved = second.forwarding.resolve(obj);
        assert_ne!(moved, obj);
        assert_eq!(heap.locate(moved.addr()), Some(Generation::Old));
        assert!(!heap.is_object(obj));

        let header = heap.header(moved).unwrap();
        assert_eq!(header.generation(), Some(Generation::Old));
        assert_eq!(header.age(), 0);
        assert_eq!(header.type_id(), id);
    }

    #[test]
    fn test_pinned_survivor_ages_in_place() {
        let (mut heap, types, id) = setup();
        let queue = FinalizerQueue::new();
        let obj = alloc(&mut heap, id);
        let header = heap.header(obj).unwrap();
        header.set_marked();
        header.set_pinned(true);

        for _ in 0..3 {
            let promotion = promote_survivors(&mut heap, &types, &queue, 0).unwrap();
            assert!(promotion.forwarding.is_empty());
        }
        assert_eq!(heap.header(obj).unwrap().age(), 3);
    }

    #[test]
    fn test_rewrite_slots_and_roots() {
        let (mut heap, types, id) = setup();
        let holder = alloc(&mut heap, id);
        let target = alloc(&mut heap, id);
        unsafe { store_slot(holder, 0, target.addr()) };

        let mut forwarding = ForwardingTable::new();
        let elsewhere = alloc(&mut heap, id);
        forwarding.record(target, elsewhere);

        rewrite_slots(&heap, &types, [holder], &forwarding).unwrap();
        assert_eq!(unsafe { load_slot(holder, 0) }, elsewhere.addr());

        let mut roots = vec![target, holder];
        rewrite_roots(&mut roots, &forwarding);
        assert_eq!(roots, vec![elsewhere, holder]);
    }
}
