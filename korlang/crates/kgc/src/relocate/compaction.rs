//! Compaction - sliding compaction of one space
//!
//! Live objects slide toward the base in address order, so relative order
//! is preserved. Immovable objects stay where they are and act as barriers:
//! nothing slides across them.
//!
//! ```text
//! before:  [A][ ][B][ ][P][ ][C]        P = pinned
//! after:   [A][B][ ][ ][P][C][ ]
//! ```

use super::ForwardingTable;
use crate::heap::Space;
use crate::object::ObjectRef;

/// Slide every movable object in `space` down; returns the moves made
///
/// Must run after sweeping: every indexed object is treated as live.
pub fn compact(space: &mut Space, immovable: impl Fn(ObjectRef) -> bool) -> ForwardingTable {
    let mut forwarding = ForwardingTable::new();
    let layout: Vec<(usize, usize)> = space.layout().collect();
    let mut cursor = space.base();

    for (addr, footprint) in layout {
        let Some(obj) = ObjectRef::from_addr(addr) else {
            continue;
        };
        if addr > cursor && !immovable(obj) {
            space.slide(addr, cursor);
            if let Some(to) = ObjectRef::from_addr(cursor) {
                forwarding.record_move(obj, to, footprint);
            }
            cursor += footprint;
        } else {
            cursor = addr + footprint;
        }
    }

    space.rebuild_free_list();
    log::debug!(
        "compaction: {} objects moved, {} bytes",
        forwarding.len(),
        forwarding.bytes_moved()
    );
    forwarding
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Generation;

    fn filled(space: &mut Space, sizes: &[usize]) -> Vec<usize> {
        sizes
            .iter()
            .map(|&size| {
                let addr = space.allocate(size).unwrap();
                unsafe { *(addr as *mut usize) = addr };
                addr
            })
            .collect()
    }

    #[test]
    fn test_slides_into_holes() {
        let mut space = Space::new(Generation::Old, 4096).unwrap();
        let addrs = filled(&mut space, &[32, 32, 32, 32]);
        space.free(addrs[0]).unwrap();
        space.free(addrs[2]).unwrap();

        let forwarding = compact(&mut space, |_| false);

        let b = ObjectRef::from_addr(addrs[1]).unwrap();
        let d = ObjectRef::from_addr(addrs[3]).unwrap();
        assert_eq!(forwarding.resolve(b).addr(), addrs[0]);
        assert_eq!(forwarding.resolve(d).addr(), addrs[1]);
        assert_eq!(unsafe { *(addrs[1] as *const usize) }, addrs[3]);
        assert_eq!(space.used(), 64);
        assert_eq!(space.largest_free_block(), space.capacity() - 64);
    }

    #[test]
    fn test_immovable_object_is_a_barrier() {
        let mut space = Space::new(Generation::Old, 4096).unwrap();
        let addrs = filled(&mut space, &[64, 32, 32, 64]);
        space.free(addrs[0]).unwrap();
        space.free(addrs[2]).unwrap();
        let pinned = addrs[1];

        let forwarding = compact(&mut space, |obj| obj.addr() == pinned);

        let last = ObjectRef::from_addr(addrs[3]).unwrap();
        assert!(forwarding.lookup(ObjectRef::from_addr(pinned).unwrap()).is_none());
        // The 64-byte object cannot jump the pinned one into the first hole
        assert_eq!(forwarding.resolve(last).addr(), addrs[2]);
        assert!(space.is_object(pinned));
    }

    #[test]
    fn test_dense_space_is_untouched() {
        let mut space = Space::new(Generation::Old, 4096).unwrap();
        filled(&mut space, &[32, 32]);
        assert!(compact(&mut space, |_| false).is_empty());
    }
}
