//! ARC/Off-heap Bridge - typed access to the header's `aux` word
//!
//! The raw `aux` word means different things depending on how the object's
//! type was registered:
//!
//! | `AuxMode`  | `aux` holds                          | collector behavior                  |
//! |------------|--------------------------------------|-------------------------------------|
//! | `Traced`   | nothing                              | ordinary reachability               |
//! | `Arc`      | reference count held by native code  | count > 0 keeps the object alive    |
//! | `OffHeap`  | handle to externally owned storage   | handle reported when the shell dies |
//!
//! The collector never frees off-heap storage; it only reports the handle of
//! a reclaimed shell in [`CycleReport::detached_off_heap`](crate::CycleReport).

use crate::error::{KgcError, Result};
use crate::object::{AuxMode, ObjectHeader, ObjectRef};
use serde::Serialize;
use std::num::NonZeroU64;
use std::sync::atomic::Ordering;

/// Opaque handle to storage owned outside the heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct OffHeapHandle(NonZeroU64);

impl OffHeapHandle {
    /// None for the null handle
    #[inline]
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(OffHeapHandle)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

/// Typed view of an object's `aux` word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aux {
    Unused,
    RefCount(u64),
    OffHeap(Option<OffHeapHandle>),
}

impl Aux {
    /// Interpret a header's `aux` word under `mode`
    pub fn read(header: &ObjectHeader, mode: AuxMode) -> Self {
        match mode {
            AuxMode::Traced => Aux::Unused,
            AuxMode::Arc => Aux::RefCount(header.aux_raw()),
            AuxMode::OffHeap => Aux::OffHeap(OffHeapHandle::new(header.aux_raw())),
        }
    }

    pub fn mode(&self) -> AuxMode {
        match self {
            Aux::Unused => AuxMode::Traced,
            Aux::RefCount(_) => AuxMode::Arc,
            Aux::OffHeap(_) => AuxMode::OffHeap,
        }
    }
}

fn expect_mode(expected: AuxMode, actual: AuxMode) -> Result<()> {
    crate::ensure!(
        expected == actual,
        KgcError::ModeMismatch { expected, actual }
    );
    Ok(())
}

/// Increment the reference count; returns the new count
pub(crate) fn retain(header: &ObjectHeader, mode: AuxMode) -> Result<u64> {
    expect_mode(AuxMode::Arc, mode)?;
    Ok(header.aux_cell().fetch_add(1, Ordering::AcqRel) + 1)
}

/// Decrement the reference count; returns the new count
///
/// Reaching zero does not reclaim anything: the object becomes an ordinary
/// candidate on the next cycle.
pub(crate) fn release(obj: ObjectRef, header: &ObjectHeader, mode: AuxMode) -> Result<u64> {
    expect_mode(AuxMode::Arc, mode)?;
    header
        .aux_cell()
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
            count.checked_sub(1)
        })
        .map(|previous| previous - 1)
        .map_err(|_| KgcError::RefCountUnderflow {
            address: obj.addr(),
        })
}

/// Store an off-heap handle; returns the one it replaced
pub(crate) fn set_off_heap(
    header: &ObjectHeader,
    mode: AuxMode,
    handle: Option<OffHeapHandle>,
) -> Result<Option<OffHeapHandle>> {
    expect_mode(AuxMode::OffHeap, mode)?;
    let raw = handle.map_or(0, OffHeapHandle::get);
    Ok(OffHeapHandle::new(
        header.aux_cell().swap(raw, Ordering::AcqRel),
    ))
}

/// True if native code holds at least one reference
#[inline]
pub(crate) fn is_retained(header: &ObjectHeader, mode: AuxMode) -> bool {
    mode == AuxMode::Arc && header.aux_raw() > 0
}

/// Off-heap handle carried by a shell about to be reclaimed
#[inline]
pub(crate) fn detached_handle(header: &ObjectHeader, mode: AuxMode) -> Option<OffHeapHandle> {
    match mode {
        AuxMode::OffHeap => OffHeapHandle::new(header.aux_raw()),
        _ => None,
    }
}
