//! Barrier Module - Write Barrier & Remembered Set
//!
//! Every reference store goes through [`post_write`], which keeps two
//! invariants after the slot has been written:
//!
//! 1. **Generational**: an old object holding a young reference is in the
//!    remembered set.
//! 2. **Incremental marking** (Dijkstra insertion barrier): while a major
//!    cycle is marking, storing into an already-marked object greys the
//!    stored target, so no black object points at a white one.

pub mod remset;

pub use remset::{references_young, RememberedSet};

use crate::error::Result;
use crate::heap::Heap;
use crate::marker::Marker;
use crate::object::{Generation, ObjectRef};
use serde::Serialize;

/// Write barrier counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BarrierStats {
    /// Reference stores seen
    pub stores: u64,
    /// Stores that added an object to the remembered set
    pub remembered: u64,
    /// Stores that greyed their target during marking
    pub shaded: u64,
}

/// Barrier work after `target` was stored into `holder`
pub fn post_write(
    heap: &Heap,
    remset: &mut RememberedSet,
    marker: Option<&mut Marker>,
    stats: &mut BarrierStats,
    holder: ObjectRef,
    target: Option<ObjectRef>,
) -> Result<()> {
    stats.stores += 1;
    let Some(target) = target else {
        return Ok(());
    };

    if heap.locate(holder.addr()) == Some(Generation::Old)
        && heap.locate(target.addr()) == Some(Generation::Young)
        && remset.insert(heap, holder)?
    {
        stats.remembered += 1;
    }

    if let Some(marker) = marker {
        if heap.header(holder)?.is_marked() && !heap.header(target)?.is_marked() {
            marker.shade(heap, target);
            stats.shaded += 1;
        }
    }

    Ok(())
}
