//! Space - one generation's backing memory
//!
//! A space is a single anonymous mapping carved by a bump pointer, with a
//! coalescing free list for holes left by reclaimed objects. It keeps an
//! index of every object start so handles can be validated without
//! trusting the header they point at.
//!
//! ```text
//! base                         top                      capacity
//! ┌──────┬──────┬────┬────────┬─────────────────────────┐
//! │ obj  │ hole │obj │  obj   │     never allocated     │
//! └──────┴──────┴────┴────────┴─────────────────────────┘
//!         free list
//! ```

use crate::error::{KgcError, Result};
use crate::object::{Generation, ObjectHeader};
use crate::util::align_to_page;
use memmap2::{MmapMut, MmapOptions};
use std::collections::BTreeMap;

/// Backing memory for one generation
pub struct Space {
    generation: Generation,
    /// Keeps the mapping alive; all access goes through `base`
    _mmap: MmapMut,
    base: usize,
    capacity: usize,
    /// Bump offset; nothing at or past it is allocated
    top: usize,
    /// Holes below `top`: offset -> length
    free: BTreeMap<usize, usize>,
    /// Live object starts: address -> footprint
    objects: BTreeMap<usize, usize>,
    used: usize,
}

impl Space {
    /// Map a space of at least `capacity` bytes
    pub fn new(generation: Generation, capacity: usize) -> Result<Self> {
        let capacity = align_to_page(capacity.max(1)).ok_or_else(|| {
            KgcError::HeapInitialization(format!(
                "{} bytes for the {} generation cannot be page aligned",
                capacity, generation
            ))
        })?;
        let mut mmap = MmapOptions::new().len(capacity).map_anon().map_err(|e| {
            KgcError::HeapInitialization(format!(
                "failed to map {} bytes for the {} generation: {}",
                capacity, generation, e
            ))
        })?;
        let base = mmap.as_mut_ptr() as usize;

        Ok(Self {
            generation,
            _mmap: mmap,
            base,
            capacity,
            top: 0,
            free: BTreeMap::new(),
            objects: BTreeMap::new(),
            used: 0,
        })
    }

    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    #[inline]
    pub fn base(&self) -> usize {
        self.base
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes held by live objects
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn occupancy(&self) -> f64 {
        self.used as f64 / self.capacity as f64
    }

    /// True if `addr` lies inside the mapping
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.base + self.capacity
    }

    /// True if `addr` is the header address of a live object
    #[inline]
    pub fn is_object(&self, addr: usize) -> bool {
        self.objects.contains_key(&addr)
    }

    #[inline]
    pub fn footprint_of(&self, addr: usize) -> Option<usize> {
        self.objects.get(&addr).copied()
    }

    #[inline]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Object addresses in ascending order
    pub fn objects(&self) -> Vec<usize> {
        self.objects.keys().copied().collect()
    }

    /// (address, footprint) pairs in ascending order
    pub fn layout(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.objects.iter().map(|(&addr, &len)| (addr, len))
    }

    /// Largest request that would currently succeed
    pub fn largest_free_block(&self) -> usize {
        let hole = self.free.values().copied().max().unwrap_or(0);
        hole.max(self.capacity - self.top)
    }

    /// Carve `footprint` bytes, first fit; memory is zeroed
    pub fn allocate(&mut self, footprint: usize) -> Option<usize> {
        let hole = self
            .free
            .iter()
            .find(|(_, &len)| len >= footprint)
            .map(|(&offset, &len)| (offset, len));

        let offset = match hole {
            Some((offset, len)) => {
                self.free.remove(&offset);
                if len > footprint {
                    self.free.insert(offset + footprint, len - footprint);
                }
                offset
            },
            None => {
                if self.capacity - self.top < footprint {
                    return None;
                }
                let offset = self.top;
                self.top += footprint;
                offset
            },
        };

        let addr = self.base + offset;
        // SAFETY: [offset, offset + footprint) lies inside the mapping and is
        // owned by no object.
        unsafe { std::ptr::write_bytes(addr as *mut u8, 0, footprint) };
        self.objects.insert(addr, footprint);
        self.used += footprint;
        Some(addr)
    }

    /// Install a header at a freshly allocated address
    pub fn install(&mut self, addr: usize, header: ObjectHeader) {
        debug_assert!(self.is_object(addr));
        // SAFETY: `addr` was returned by `allocate` and is 8-byte aligned.
        unsafe { std::ptr::write(addr as *mut ObjectHeader, header) };
    }

    /// Return an object's memory to the free list; returns its footprint
    pub fn free(&mut self, addr: usize) -> Result<usize> {
        let footprint = self
            .objects
            .remove(&addr)
            .ok_or(KgcError::InvalidHandle { address: addr })?;
        self.used -= footprint;

        // SAFETY: the block belonged to the object just removed.
        unsafe { std::ptr::write_bytes(addr as *mut u8, 0, footprint) };
        self.release(addr - self.base, footprint);
        Ok(footprint)
    }

    fn release(&mut self, mut offset: usize, mut len: usize) {
        if let Some((&prev, &prev_len)) = self.free.range(..offset).next_back() {
            if prev + prev_len == offset {
                self.free.remove(&prev);
                offset = prev;
                len += prev_len;
            }
        }
        if let Some(next_len) = self.free.remove(&(offset + len)) {
            len += next_len;
        }

        if offset + len == self.top {
            self.top = offset;
        } else {
            self.free.insert(offset, len);
        }
    }

    /// Slide an object to a lower address inside this space
    ///
    /// The index and free list are stale until [`Space::rebuild_free_list`].
    pub(crate) fn slide(&mut self, from: usize, to: usize) {
        debug_assert!(to < from);
        if let Some(footprint) = self.objects.remove(&from) {
            // SAFETY: both ranges are inside the mapping; `copy` tolerates
            // the overlap of a short slide.
            unsafe { std::ptr::copy(from as *const u8, to as *mut u8, footprint) };
            self.objects.insert(to, footprint);
        }
    }

    /// Recompute holes and top from the object index, zeroing every hole
    pub(crate) fn rebuild_free_list(&mut self) {
        self.free.clear();
        let mut cursor = 0;
        let mut holes = Vec::new();
        for (&addr, &len) in &self.objects {
            let offset = addr - self.base;
            if offset > cursor {
                holes.push((cursor, offset - cursor));
            }
            cursor = offset + len;
        }
        let old_top = self.top;
        self.top = cursor;

        for (offset, len) in holes {
            self.zero(offset, len);
            self.free.insert(offset, len);
        }
        if old_top > cursor {
            self.zero(cursor, old_top - cursor);
        }
    }

    fn zero(&mut self, offset: usize, len: usize) {
        // SAFETY: callers pass ranges inside the mapping owned by no object.
        unsafe { std::ptr::write_bytes((self.base + offset) as *mut u8, 0, len) };
    }

    #[cfg(test)]
    pub(crate) fn free_blocks(&self) -> usize {
        self.free.len()
    }
}

impl std::fmt::Debug for Space {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Space")
            .field("generation", &self.generation)
            .field("base", &format_args!("{:#x}", self.base))
            .field("capacity", &self.capacity)
            .field("used", &self.used)
            .field("objects", &self.objects.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> Space {
        Space::new(Generation::Young, 4096).unwrap()
    }

    #[test]
    fn test_capacity_is_page_rounded() {
        let space = Space::new(Generation::Old, 10).unwrap();
        assert_eq!(space.capacity(), page_size::get());
        assert_eq!(space.used(), 0);
        assert_eq!(space.largest_free_block(), space.capacity());
    }

    #[test]
    fn test_bump_allocation() {
        let mut space = space();
        let a = space.allocate(48).unwrap();
        let b = space.allocate(32).unwrap();

        assert_eq!(a, space.base());
        assert_eq!(b, a + 48);
        assert!(space.is_object(a));
        assert!(!space.is_object(a + 8));
        assert_eq!(space.used(), 80);
    }

    #[test]
    fn test_free_reuses_hole_first_fit() {
        let mut space = space();
        let a = space.allocate(64).unwrap();
        let _b = space.allocate(32).unwrap();

        assert_eq!(space.free(a).unwrap(), 64);
        let c = space.allocate(32).unwrap();
        assert_eq!(c, a);
        let d = space.allocate(32).unwrap();
        assert_eq!(d, a + 32);
        assert_eq!(space.free_blocks(), 0);
    }

    #[test]
    fn test_free_coalesces_and_lowers_top() {
        let mut space = space();
        let a = space.allocate(32).unwrap();
        let b = space.allocate(32).unwrap();
        let c = space.allocate(32).unwrap();

        space.free(a).unwrap();
        space.free(b).unwrap();
        assert_eq!(space.free_blocks(), 1);

        space.free(c).unwrap();
        assert_eq!(space.free_blocks(), 0);
        assert_eq!(space.largest_free_block(), space.capacity());
        assert_eq!(space.allocate(32), Some(a));
    }

    #[test]
    fn test_exhaustion() {
        let mut space = space();
        let cap = space.capacity();
        assert!(space.allocate(cap).is_some());
        assert!(space.allocate(8).is_none());
        assert_eq!(space.largest_free_block(), 0);
    }

    #[test]
    fn test_freed_memory_is_zeroed() {
        let mut space = space();
        let a = space.allocate(16).unwrap();
        unsafe { *(a as *mut u64) = 0xDEAD_BEEF };
        let _pad = space.allocate(16).unwrap();
        space.free(a).unwrap();
        assert_eq!(unsafe { *(a as *const u64) }, 0);
    }

    #[test]
    fn test_double_free_is_rejected() {
        let mut space = space();
        let a = space.allocate(16).unwrap();
        space.free(a).unwrap();
        assert!(matches!(
            space.free(a),
            Err(KgcError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn test_slide_and_rebuild() {
        let mut space = space();
        let a = space.allocate(32).unwrap();
        let b = space.allocate(32).unwrap();
        unsafe { *(b as *mut u64) = 77 };
        space.free(a).unwrap();

        space.slide(b, a);
        space.rebuild_free_list();

        assert!(space.is_object(a));
        assert!(!space.is_object(b));
        assert_eq!(unsafe { *(a as *const u64) }, 77);
        assert_eq!(unsafe { *(b as *const u64) }, 0);
        assert_eq!(space.allocate(32), Some(b));
    }
}
