//! Object Header - Metadata prefixed to every GC-managed payload
//!
//! Object Header Layout (32 bytes, 8-byte aligned):
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  flags (u32, atomic)                    │
//! │  - Bit 0: MARKED                        │
//! │  - Bit 1: PINNED                        │
//! │  - Bit 2: HAS_FINALIZER                 │
//! │  - Bit 3: REMEMBERED (remembered set)   │
//! │  - Bits 4-15: reserved                  │
//! │  - Bits 16-31: embedding runtime        │
//! ├────────────────────┬────────────────────┤
//! │  age (u16, atomic) │  gen (u16, atomic) │
//! ├────────────────────┴────────────────────┤
//! │  size (u64) - payload bytes             │
//! ├─────────────────────────────────────────┤
//! │  type_id (u64) - type table index       │
//! ├─────────────────────────────────────────┤
//! │  aux (u64, atomic) - ARC count or       │
//! │  off-heap handle, per the type's mode   │
//! ├─────────────────────────────────────────┤
//! │  payload (size bytes, 8-byte padded)    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Every bit operation touches only its own bits, so bits the collector does
//! not recognise survive every cycle untouched.

use super::types::TypeId;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, Ordering};

/// Size of object header in bytes
pub const HEADER_SIZE: usize = 32;

/// Minimum object alignment (bytes)
pub const OBJECT_ALIGNMENT: usize = 8;

/// Flag bit positions
pub const MARKED_BIT: u32 = 0;
pub const PINNED_BIT: u32 = 1;
pub const FINALIZER_BIT: u32 = 2;
pub const REMEMBERED_BIT: u32 = 3;
pub const USER_SHIFT: u32 = 16;

/// Masks for flag fields
pub const MARKED: u32 = 1 << MARKED_BIT;
pub const PINNED: u32 = 1 << PINNED_BIT;
pub const HAS_FINALIZER: u32 = 1 << FINALIZER_BIT;
pub const REMEMBERED: u32 = 1 << REMEMBERED_BIT;
pub const RESERVED_MASK: u32 = 0x0000_FFF0;
pub const USER_MASK: u32 = 0xFFFF << USER_SHIFT;

/// Generation an object lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub enum Generation {
    Young = 0,
    Old = 1,
}

impl Generation {
    fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(Generation::Young),
            1 => Some(Generation::Old),
            _ => None,
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Young => f.write_str("young"),
            Generation::Old => f.write_str("old"),
        }
    }
}

/// Handle to a heap object: the address of its header
///
/// Handles stay valid until the collector relocates the object. Relocation
/// rewrites every reference the collector knows about (roots handed in via a
/// [`RootProvider`](crate::marker::RootProvider), reference slots, the
/// remembered set); copies kept anywhere else go stale.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef(NonZeroUsize);

impl ObjectRef {
    /// Build a handle from a raw header address
    #[inline]
    pub fn from_addr(addr: usize) -> Option<Self> {
        NonZeroUsize::new(addr).map(ObjectRef)
    }

    /// Header address
    #[inline]
    pub fn addr(self) -> usize {
        self.0.get()
    }

    /// First payload byte
    #[inline]
    pub fn payload_addr(self) -> usize {
        self.addr() + HEADER_SIZE
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.addr())
    }
}

/// Object Header
///
/// Fields mutated during a cycle are atomics so that ARC retain/release and
/// pin requests can run against a shared reference. `size` and `type_id` are
/// written once at allocation and never again.
#[repr(C)]
pub struct ObjectHeader {
    flags: AtomicU32,
    age: AtomicU16,
    gen: AtomicU16,
    size: u64,
    type_id: u64,
    aux: AtomicU64,
}

impl ObjectHeader {
    /// Create a fresh header for a new allocation
    pub fn new(type_id: TypeId, size: usize, has_finalizer: bool) -> Self {
        Self {
            flags: AtomicU32::new(if has_finalizer { HAS_FINALIZER } else { 0 }),
            age: AtomicU16::new(0),
            gen: AtomicU16::new(Generation::Young as u16),
            size: size as u64,
            type_id: type_id.as_raw(),
            aux: AtomicU64::new(0),
        }
    }

    /// Total footprint of an object with a payload of `size` bytes;
    /// `None` if it does not fit in a `usize`
    #[inline]
    pub fn footprint(size: usize) -> Option<usize> {
        crate::util::align_up(size, OBJECT_ALIGNMENT)?.checked_add(HEADER_SIZE)
    }

    // === Flag Operations ===

    #[inline]
    pub fn flags(&self) -> u32 {
        self.flags.load(Ordering::Acquire)
    }

    #[inline]
    fn set_bits(&self, mask: u32) -> bool {
        self.flags.fetch_or(mask, Ordering::AcqRel) & mask != 0
    }

    #[inline]
    fn clear_bits(&self, mask: u32) {
        self.flags.fetch_and(!mask, Ordering::AcqRel);
    }

    #[inline]
    pub fn is_marked(&self) -> bool {
        self.flags() & MARKED != 0
    }

    /// Set MARKED; returns true if it was already set
    #[inline]
    pub fn set_marked(&self) -> bool {
        self.set_bits(MARKED)
    }

    #[inline]
    pub fn clear_marked(&self) {
        self.clear_bits(MARKED);
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.flags() & PINNED != 0
    }

    #[inline]
    pub(crate) fn set_pinned(&self, pinned: bool) {
        if pinned {
            self.set_bits(PINNED);
        } else {
            self.clear_bits(PINNED);
        }
    }

    #[inline]
    pub fn has_finalizer(&self) -> bool {
        self.flags() & HAS_FINALIZER != 0
    }

    #[inline]
    pub fn is_remembered(&self) -> bool {
        self.flags() & REMEMBERED != 0
    }

    /// Set REMEMBERED; returns true if it was already set
    #[inline]
    pub(crate) fn set_remembered(&self) -> bool {
        self.set_bits(REMEMBERED)
    }

    #[inline]
    pub(crate) fn clear_remembered(&self) {
        self.clear_bits(REMEMBERED);
    }

    /// Bits 16-31, owned by the embedding runtime
    #[inline]
    pub fn user_flags(&self) -> u16 {
        (self.flags() >> USER_SHIFT) as u16
    }

    /// Replace bits 16-31 without disturbing collector bits
    pub fn set_user_flags(&self, bits: u16) {
        let mut current = self.flags.load(Ordering::Acquire);
        loop {
            let new = (current & !USER_MASK) | ((bits as u32) << USER_SHIFT);
            match self
                .flags
                .compare_exchange_weak(current, new, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(val) => current = val,
            }
        }
    }

    // === Generational Fields ===

    #[inline]
    pub fn age(&self) -> u16 {
        self.age.load(Ordering::Relaxed)
    }

    /// Increment age, saturating at u16::MAX; returns the new age
    #[inline]
    pub(crate) fn increment_age(&self) -> u16 {
        let age = self.age().saturating_add(1);
        self.age.store(age, Ordering::Relaxed);
        age
    }

    /// Raw generation value, unchecked
    #[inline]
    pub fn raw_generation(&self) -> u16 {
        self.gen.load(Ordering::Acquire)
    }

    /// Generation, or None if the field holds garbage
    #[inline]
    pub fn generation(&self) -> Option<Generation> {
        Generation::from_raw(self.raw_generation())
    }

    /// Young -> old transition. Resets age.
    #[inline]
    pub(crate) fn promote(&self) {
        self.gen.store(Generation::Old as u16, Ordering::Release);
        self.age.store(0, Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn corrupt_generation(&self, raw: u16) {
        self.gen.store(raw, Ordering::Release);
    }

    // === Immutable Fields ===

    /// Payload size in bytes, excluding the header
    #[inline]
    pub fn size(&self) -> usize {
        self.size as usize
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        TypeId::from_raw(self.type_id)
    }

    // === Aux Slot ===

    #[inline]
    pub(crate) fn aux_raw(&self) -> u64 {
        self.aux.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn aux_cell(&self) -> &AtomicU64 {
        &self.aux
    }
}

impl fmt::Debug for ObjectHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHeader")
            .field("flags", &format_args!("{:#010x}", self.flags()))
            .field("age", &self.age())
            .field("gen", &self.raw_generation())
            .field("size", &self.size)
            .field("type_id", &self.type_id())
            .field("aux", &self.aux_raw())
            .finish()
    }
}

/// Get header for an object
///
/// # Safety
/// `obj` must point to a header installed by the allocator that has not been
/// reclaimed.
#[inline]
pub unsafe fn header_of<'a>(obj: ObjectRef) -> &'a ObjectHeader {
    &*(obj.addr() as *const ObjectHeader)
}
