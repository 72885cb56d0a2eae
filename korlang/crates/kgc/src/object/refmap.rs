//! Reference Map - Tells the collector where reference slots live in a payload
//!
//! Every reference slot is 8 bytes wide, 8-byte aligned, and holds the
//! header address of its target (0 = null).
//!
//! # Layout
//!
//! ```text
//! Payload Layout:
//! ┌─────────┬─────────┬─────────┬─────────┐
//! │ 0-7     │ 8-15    │ 16-23   │ 24-31   │
//! ├─────────┼─────────┼─────────┼─────────┤
//! │ ref     │ i64     │ ref     │ bytes   │
//! └─────────┴─────────┴─────────┴─────────┘
//! offsets = [0, 16]
//! ```
//!
//! # Example
//!
//! ```rust
//! use kgc::object::ReferenceMap;
//!
//! let map = ReferenceMap::new(&[16, 0]);
//!
//! assert!(map.is_reference(0));
//! assert!(!map.is_reference(8));
//! assert_eq!(map.iter().collect::<Vec<_>>(), vec![0, 16]);
//! ```

use crate::error::{KgcError, Result};

/// Size of each reference slot (in bytes)
pub const SLOT_SIZE: usize = 8;

/// Ordered, duplicate-free list of reference-slot offsets
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReferenceMap {
    offsets: Vec<usize>,
}

impl ReferenceMap {
    /// Reference map with no slots
    #[inline]
    pub const fn empty() -> Self {
        Self {
            offsets: Vec::new(),
        }
    }

    /// Build a map from offsets in any order; duplicates collapse
    pub fn new(offsets: &[usize]) -> Self {
        let mut offsets = offsets.to_vec();
        offsets.sort_unstable();
        offsets.dedup();
        Self { offsets }
    }

    /// Check every offset is slot-aligned and fits a payload of `size` bytes
    pub fn validate(&self, size: usize) -> Result<()> {
        for &offset in &self.offsets {
            if offset % SLOT_SIZE != 0 {
                return Err(KgcError::InvalidArgument(format!(
                    "reference offset {} is not {}-byte aligned",
                    offset, SLOT_SIZE
                )));
            }
            if offset.checked_add(SLOT_SIZE).map_or(true, |end| end > size) {
                return Err(KgcError::InvalidArgument(format!(
                    "reference offset {} exceeds payload size {}",
                    offset, size
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn is_reference(&self, offset: usize) -> bool {
        self.offsets.binary_search(&offset).is_ok()
    }

    /// True if `[start, start + len)` touches any reference slot
    pub fn overlaps(&self, start: usize, len: usize) -> bool {
        let end = start.saturating_add(len);
        len > 0
            && self
                .offsets
                .iter()
                .any(|&slot| slot < end && start < slot.saturating_add(SLOT_SIZE))
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Smallest payload able to hold every slot
    #[inline]
    pub fn min_payload(&self) -> usize {
        self.offsets.last().map_or(0, |&last| last.saturating_add(SLOT_SIZE))
    }

    /// Offsets in ascending order
    #[inline]
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = usize> + ExactSizeIterator + '_ {
        self.offsets.iter().copied()
    }

    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.offsets
    }
}

/// Builder for creating ReferenceMap with a fluent API
///
/// ```rust
/// use kgc::object::refmap::ReferenceMapBuilder;
///
/// let map = ReferenceMapBuilder::new()
///     .with_reference(0)
///     .with_reference(16)
///     .build();
///
/// assert_eq!(map.count(), 2);
/// ```
#[derive(Debug, Default)]
pub struct ReferenceMapBuilder {
    offsets: Vec<usize>,
}

impl ReferenceMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference(mut self, offset: usize) -> Self {
        self.offsets.push(offset);
        self
    }

    pub fn build(self) -> ReferenceMap {
        ReferenceMap::new(&self.offsets)
    }
}
