//! Remembered Set - old objects that may reference young objects
//!
//! Minor collections never scan the old generation. Instead the write
//! barrier records every old object that receives a young reference, and
//! promotion records every promoted object that still holds one. The
//! header's REMEMBERED bit mirrors membership so repeated stores stay cheap.

use crate::error::Result;
use crate::heap::Heap;
use crate::marker::children;
use crate::object::{Generation, ObjectRef, TypeTable};
use indexmap::IndexSet;

/// RememberedSet - old-to-young edge sources
#[derive(Debug, Default)]
pub struct RememberedSet {
    entries: IndexSet<ObjectRef>,
}

impl RememberedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an old object; returns false if it was already recorded
    pub fn insert(&mut self, heap: &Heap, obj: ObjectRef) -> Result<bool> {
        if heap.header(obj)?.set_remembered() {
            return Ok(false);
        }
        Ok(self.entries.insert(obj))
    }

    #[inline]
    pub fn contains(&self, obj: ObjectRef) -> bool {
        self.entries.contains(&obj)
    }

    /// Members in recording order
    pub fn members(&self) -> Vec<ObjectRef> {
        self.entries.iter().copied().collect()
    }

    /// Drop members that no longer reference any young object
    pub fn prune(&mut self, heap: &Heap, types: &TypeTable) -> Result<usize> {
        let before = self.entries.len();
        let mut kept = IndexSet::with_capacity(before);
        for &obj in &self.entries {
            if !heap.is_object(obj) {
                continue;
            }
            if references_young(heap, types, obj)? {
                kept.insert(obj);
            } else {
                heap.header(obj)?.clear_remembered();
            }
        }
        self.entries = kept;
        Ok(before - self.entries.len())
    }

    /// Recompute membership from every old object
    pub fn rebuild(&mut self, heap: &Heap, types: &TypeTable) -> Result<()> {
        self.entries.clear();
        for addr in heap.old.objects() {
            let Some(obj) = ObjectRef::from_addr(addr) else {
                continue;
            };
            let header = heap.header(obj)?;
            if references_young(heap, types, obj)? {
                header.set_remembered();
                self.entries.insert(obj);
            } else {
                header.clear_remembered();
            }
        }
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// True if any slot of `obj` names a young object
pub fn references_young(heap: &Heap, types: &TypeTable, obj: ObjectRef) -> Result<bool> {
    Ok(children(heap, types, obj)?
        .into_iter()
        .any(|kid| heap.locate(kid.addr()) == Some(Generation::Young)))
}
