//! # KGC - Generational Garbage Collector for the Korlang Runtime
//!
//! KGC manages Korlang heap objects: every object carries a fixed 32-byte
//! header, lives first in a young generation and moves to an old generation
//! once it has survived enough minor cycles.
//!
//! ## Overview
//!
//! - **Object Header**: mark/pin/finalizer/remembered flags, age, generation,
//!   payload size, type id and an `aux` word for ARC counts or off-heap
//!   handles
//! - **Type Table**: registered layouts with ordered reference-slot offsets
//! - **Precise Roots**: the embedding runtime supplies roots through
//!   [`RootProvider`]; the collector never scans native stacks
//! - **Generational Collection**: minor cycles trace the young generation
//!   plus a remembered set; major cycles trace everything and compact the
//!   old generation
//! - **Finalization**: unreachable finalizable objects pass through a queue
//!   the runtime drains, exactly once per unreachability event
//! - **ARC Bridge**: native code can retain objects through a reference count
//!   kept in the header
//!
//! ## Quick Start
//!
//! ```rust
//! use kgc::{GarbageCollector, GcConfig, ShadowStack, TypeInfo};
//!
//! fn main() -> kgc::Result<()> {
//!     let gc = GarbageCollector::new(GcConfig::default())?;
//!     let pair = gc.register_type(TypeInfo::new("pair", 16).with_refs(&[0, 8]))?;
//!
//!     // Roots live on a shadow stack the collector can see
//!     let stack = ShadowStack::new();
//!     gc.set_root_provider(stack.clone());
//!
//!     let head = gc.allocate_type(pair)?;
//!     let slot = stack.push(head);
//!     let tail = gc.allocate_type(pair)?;
//!     gc.write_ref(head, 8, Some(tail))?;
//!
//!     let mut extra: Vec<kgc::ObjectRef> = Vec::new();
//!     gc.collect_minor(&mut extra)?;
//!     gc.collect_minor(&mut extra)?;
//!
//!     // The pair was promoted; the shadow stack slot followed it
//!     let head = stack.get(slot).expect("slot");
//!     assert!(gc.is_live(head));
//!     assert!(gc.read_ref(head, 8)?.is_some());
//!     Ok(())
//! }
//! ```
//!
//! ## Object Layout
//!
//! ```text
//! ObjectRef ─▶ ┌──────────┬───────┬───────┬──────────┬──────────┬──────────┐
//!              │ flags:32 │ age:16│ gen:16│ size:64  │ type:64  │ aux:64   │
//!              ├──────────┴───────┴───────┴──────────┴──────────┴──────────┤
//!              │ payload (size bytes, 8-byte aligned, reference slots hold  │
//!              │ header addresses of their targets, 0 = null)               │
//!              └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Thread Safety
//!
//! - `GarbageCollector` is `Send + Sync`
//! - All heap state sits behind one world lock; collections are
//!   stop-the-world with respect to other collector calls
//! - Finalizers run outside the world lock, on the caller's thread or on a
//!   [`FinalizerDaemon`]
//!
//! ## Modules
//!
//! - [`allocator`]: request checks and young-generation carving
//! - [`barrier`]: write barrier and remembered set
//! - [`bridge`]: ARC counts and off-heap handles in the `aux` word
//! - [`config`]: GC configuration parameters and validation
//! - [`error`]: error types for all KGC operations
//! - [`gc`]: the collector facade and cycle orchestration
//! - [`heap`]: the two generations, object lookup and the adaptive minor trigger
//! - [`logging`]: structured GC events
//! - [`marker`]: root providers and reachability tracing
//! - [`object`]: header, type table and reference maps
//! - [`relocate`]: promotion, compaction and reference rewriting
//! - [`runtime`]: finalizer queue and daemon
//! - [`stats`]: cycle reports, pause histogram and counters
//! - [`sweeper`]: reclaiming unmarked objects
//! - [`util`]: alignment helpers and constants

// Core GC modules
pub mod config;
pub mod error;
pub mod gc;

// Memory and object model
pub mod allocator;
pub mod bridge;
pub mod heap;
pub mod object;

// GC algorithm components
pub mod barrier;
pub mod marker;
pub mod relocate;
pub mod sweeper;

// Runtime and monitoring
pub mod logging;
pub mod runtime;
pub mod stats;

// Utilities
pub mod util;

// Re-export main types for convenience
pub use bridge::{Aux, OffHeapHandle};
pub use config::{ConfigError, GcConfig};
pub use error::{KgcError, Result};
pub use gc::{GarbageCollector, GcHealth, GcState, ObjectInfo};
pub use marker::{RootProvider, RootSet, ShadowStack};
pub use object::{AuxMode, Generation, ObjectRef, ReferenceMap, TypeId, TypeInfo, HEADER_SIZE};
pub use runtime::{FinalizerDaemon, FinalizerState};
pub use stats::{CycleKind, CycleReport, GcReason, GcStats};

/// KGC version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create a collector configured from `KGC_*` environment variables
///
/// ```rust
/// let gc = kgc::init()?;
/// assert_eq!(gc.cycle_count(), 0);
/// # Ok::<(), kgc::KgcError>(())
/// ```
pub fn init() -> Result<GarbageCollector> {
    GarbageCollector::new(GcConfig::from_env())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_default() {
        assert!(init().is_ok());
    }

    #[test]
    fn test_version_not_empty() {
        assert!(!VERSION.is_empty());
    }
}
