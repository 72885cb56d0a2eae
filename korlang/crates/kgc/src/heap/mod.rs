//! Heap Module - the two generations and object lookup
//!
//! The young space receives every allocation; the old space receives
//! promoted survivors. Every handle crossing the public API is checked
//! against the space indexes before its header is read.

pub mod adaptive;
pub mod space;

pub use adaptive::{AdaptiveConfig, AdaptiveTrigger, TriggerAdjustment, TriggerChange};
pub use space::Space;

use crate::config::GcConfig;
use crate::error::{KgcError, Result};
use crate::object::{header_of, Generation, ObjectHeader, ObjectRef, TypeTable};

/// Young and old generations
#[derive(Debug)]
pub struct Heap {
    pub young: Space,
    pub old: Space,
}

impl Heap {
    pub fn new(config: &GcConfig) -> Result<Self> {
        Ok(Self {
            young: Space::new(Generation::Young, config.young_capacity)?,
            old: Space::new(Generation::Old, config.old_capacity)?,
        })
    }

    #[inline]
    pub fn space(&self, generation: Generation) -> &Space {
        match generation {
            Generation::Young => &self.young,
            Generation::Old => &self.old,
        }
    }

    #[inline]
    pub fn space_mut(&mut self, generation: Generation) -> &mut Space {
        match generation {
            Generation::Young => &mut self.young,
            Generation::Old => &mut self.old,
        }
    }

    /// Space holding the object at `addr`, if any
    #[inline]
    pub fn locate(&self, addr: usize) -> Option<Generation> {
        if self.young.is_object(addr) {
            Some(Generation::Young)
        } else if self.old.is_object(addr) {
            Some(Generation::Old)
        } else {
            None
        }
    }

    #[inline]
    pub fn is_object(&self, obj: ObjectRef) -> bool {
        self.locate(obj.addr()).is_some()
    }

    /// Header of a live object
    pub fn header(&self, obj: ObjectRef) -> Result<&ObjectHeader> {
        if !self.is_object(obj) {
            return Err(KgcError::invalid_handle(obj));
        }
        // SAFETY: the address is a live object start in one of our spaces.
        Ok(unsafe { header_of(obj) })
    }

    /// Resolve a raw reference slot value
    pub fn resolve_slot(&self, holder: ObjectRef, offset: usize, raw: usize) -> Result<Option<ObjectRef>> {
        match ObjectRef::from_addr(raw) {
            None => Ok(None),
            Some(target) if self.is_object(target) => Ok(Some(target)),
            Some(_) => Err(KgcError::corrupt(
                holder.addr(),
                format!("slot +{} names {:#x}, which is not an object", offset, raw),
            )),
        }
    }

    /// Check every header against the space it lives in
    pub fn verify(&self, types: &TypeTable) -> Result<()> {
        for space in [&self.young, &self.old] {
            for (addr, footprint) in space.layout() {
                // SAFETY: `addr` comes from the space index.
                let header = unsafe { header_of_addr(addr) };
                match header.generation() {
                    Some(gen) if gen == space.generation() => {},
                    _ => {
                        return Err(KgcError::corrupt(
                            addr,
                            format!(
                                "gen {} in {} space",
                                header.raw_generation(),
                                space.generation()
                            ),
                        ))
                    },
                }
                if !types.contains(header.type_id()) {
                    return Err(KgcError::corrupt(
                        addr,
                        format!("unregistered type {}", header.type_id()),
                    ));
                }
                if ObjectHeader::footprint(header.size()) != Some(footprint) {
                    return Err(KgcError::corrupt(
                        addr,
                        format!(
                            "payload size {} disagrees with footprint {}",
                            header.size(),
                            footprint
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Occupancy of both generations together
    pub fn pressure(&self) -> f64 {
        let used = self.young.used() + self.old.used();
        let capacity = self.young.capacity() + self.old.capacity();
        used as f64 / capacity as f64
    }
}

/// # Safety
/// `addr` must be a live object start.
#[inline]
pub(crate) unsafe fn header_of_addr<'a>(addr: usize) -> &'a ObjectHeader {
    &*(addr as *const ObjectHeader)
}

/// Read the raw reference slot at `offset` in `obj`'s payload
///
/// # Safety
/// `obj` must be live and `offset + 8` within its payload.
#[inline]
pub(crate) unsafe fn load_slot(obj: ObjectRef, offset: usize) -> usize {
    std::ptr::read((obj.payload_addr() + offset) as *const usize)
}

/// Overwrite the raw reference slot at `offset` in `obj`'s payload
///
/// # Safety
/// `obj` must be live and `offset + 8` within its payload.
#[inline]
pub(crate) unsafe fn store_slot(obj: ObjectRef, offset: usize, value: usize) {
    std::ptr::write((obj.payload_addr() + offset) as *mut usize, value)
}
