//! Allocator Module - carving young-generation objects
//!
//! Every object starts life in the young space. The collector facade owns
//! the policy around this module (watermark-triggered minor cycles, the
//! single retry after an allocation failure); this module owns the request
//! checks and the header installation.
//!
//! ## Allocation Flow
//!
//! 1. [`footprint_for`] validates the request against the type's layout
//! 2. [`crosses_watermark`] tells the caller whether to collect first
//! 3. [`try_allocate`] carves first fit, zeroes and installs the header

use crate::error::{KgcError, Result};
use crate::heap::Space;
use crate::object::{ObjectHeader, ObjectRef, TypeId, TypeInfo};

/// Footprint of a `size`-byte instance of `info`
///
/// Rejects payloads too small for the type's last reference slot. A
/// footprint that overflows `usize` saturates to `usize::MAX`, which no
/// space can satisfy.
pub fn footprint_for(info: &TypeInfo, size: usize) -> Result<usize> {
    let min = info.refs.min_payload();
    if size < min {
        return Err(KgcError::InvalidArgument(format!(
            "{} needs at least {} payload bytes, got {}",
            info.name, min, size
        )));
    }
    Ok(ObjectHeader::footprint(size).unwrap_or(usize::MAX))
}

/// True if no collection can ever make room for `footprint` bytes
#[inline]
pub fn exceeds_capacity(young: &Space, footprint: usize) -> bool {
    footprint > young.capacity()
}

/// True if carving `footprint` more bytes would take young occupancy past
/// the minor trigger
#[inline]
pub fn crosses_watermark(young: &Space, footprint: usize, trigger_bytes: usize) -> bool {
    young.used().saturating_add(footprint) > trigger_bytes
}

/// Carve and initialize an object; `None` if no block fits
pub fn try_allocate(
    young: &mut Space,
    type_id: TypeId,
    size: usize,
    has_finalizer: bool,
) -> Option<ObjectRef> {
    let addr = young.allocate(ObjectHeader::footprint(size)?)?;
    young.install(addr, ObjectHeader::new(type_id, size, has_finalizer));
    ObjectRef::from_addr(addr)
}
