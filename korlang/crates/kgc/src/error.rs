//! Error Module - KGC Error Types
//!
//! Defines all error types used by the collector.
//!
//! # Error Categories
//!
//! ## Allocation Errors
//! - `OutOfMemory` - Young generation exhausted even after a minor collection
//! - `InvalidArgument` - Payload too small for the type's reference slots, bad offsets
//!
//! ## Embedding Errors
//! - `TypeNotRegistered` - Registration-ordering bug in the embedding runtime
//! - `InvalidHandle` - Handle does not name a live object
//! - `ModeMismatch` - ARC/off-heap call on an object of another aux mode
//! - `RefCountUnderflow` - `release` without a matching `retain`
//! - `NotPinned` - `unpin` without a matching `pin`
//! - `FinalizerState` - Finalizer completion reported out of order
//!
//! ## Collector Errors
//! - `CorruptHeader` - Heap consistency check failed; the collector halts
//! - `CollectorHalted` - Collection requested after a corrupt header was found
//! - `InvalidState` - Internal state machine violation
//!
//! ## Configuration Errors
//! - `Configuration` - Invalid configuration
//! - `HeapInitialization` - Backing memory could not be mapped
//!
//! Pinned objects, resurrection and ARC counts reaching zero are ordinary
//! control flow and never surface as errors.

use crate::object::{AuxMode, ObjectRef, TypeId};
use thiserror::Error;

/// Main error type for all KGC operations
///
/// # Examples
///
/// ```rust
/// use kgc::KgcError;
///
/// fn handle_error(err: KgcError) {
///     match err {
///         KgcError::OutOfMemory { requested, available } => {
///             eprintln!("OOM: requested {}, available {}", requested, available);
///         }
///         KgcError::CorruptHeader { address, reason } => {
///             eprintln!("heap corrupt at {:#x}: {}", address, reason);
///         }
///         _ => {
///             eprintln!("Other error: {}", err);
///         }
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum KgcError {
    /// Out of memory - young generation cannot fit the request
    ///
    /// **When returned:** No contiguous block fits after the single minor
    /// collection an allocation is allowed to trigger.
    ///
    /// **Recovery strategy:** Caller decides: request a major collection,
    /// enlarge the generation, or fail the allocation.
    #[error("Out of memory: requested {requested} bytes, largest free block {available} bytes")]
    OutOfMemory { requested: usize, available: usize },

    /// Type identity not present in the type table
    ///
    /// **When returned:** Allocation or trace names a `type_id` that was
    /// never registered.
    ///
    /// **Recovery strategy:** None - fix registration order.
    #[error("Type {type_id} is not registered")]
    TypeNotRegistered { type_id: TypeId },

    /// Internal consistency check failed
    ///
    /// **When returned:** Header verification or tracing found a header that
    /// contradicts the heap layout (wrong generation for its space, unknown
    /// type, dangling reference slot).
    ///
    /// **Recovery strategy:** None - the collector halts further collection.
    #[error("Corrupt header at {address:#x}: {reason}")]
    CorruptHeader { address: usize, reason: String },

    /// Collector halted after an earlier `CorruptHeader`
    #[error("Collector halted after heap corruption was detected")]
    CollectorHalted,

    /// Handle does not name a live object
    #[error("Invalid object handle: {address:#x}")]
    InvalidHandle { address: usize },

    /// Bridge operation on an object whose type uses another aux mode
    #[error("Aux mode mismatch: expected {expected:?}, object uses {actual:?}")]
    ModeMismatch { expected: AuxMode, actual: AuxMode },

    /// `release` on an ARC object whose count is already zero
    #[error("Reference count underflow on {address:#x}")]
    RefCountUnderflow { address: usize },

    /// `unpin` on an object that holds no pin
    #[error("Object {address:#x} is not pinned")]
    NotPinned { address: usize },

    /// Finalizer queue transition requested from the wrong state
    #[error("Finalizer state error on {address:#x}: expected {expected}, got {actual}")]
    FinalizerState {
        address: usize,
        expected: &'static str,
        actual: &'static str,
    },

    /// Invalid argument
    ///
    /// **Example scenarios:**
    /// - Reference offset not declared by the object's type
    /// - Scalar write overlapping a reference slot
    /// - Payload smaller than the type's last reference slot
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backing memory for a generation could not be mapped
    #[error("Heap initialization failed: {0}")]
    HeapInitialization(String),

    /// Invalid state
    ///
    /// **Example scenario:** incremental mark step requested while no
    /// incremental major cycle is running
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl KgcError {
    /// Check if this error is recoverable by the caller
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            KgcError::OutOfMemory { .. }
                | KgcError::InvalidArgument(_)
                | KgcError::NotPinned { .. }
                | KgcError::FinalizerState { .. }
        )
    }

    /// Check if this error leaves the collector unusable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            KgcError::TypeNotRegistered { .. }
                | KgcError::CorruptHeader { .. }
                | KgcError::CollectorHalted
                | KgcError::HeapInitialization(_)
        )
    }

    pub(crate) fn invalid_handle(obj: ObjectRef) -> Self {
        KgcError::InvalidHandle {
            address: obj.addr(),
        }
    }

    pub(crate) fn corrupt(address: usize, reason: impl Into<String>) -> Self {
        KgcError::CorruptHeader {
            address,
            reason: reason.into(),
        }
    }
}

/// Result type alias for KGC operations
pub type Result<T> = std::result::Result<T, KgcError>;

/// Ensure condition is true, otherwise return error
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}
