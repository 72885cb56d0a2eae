//! Object Module - GC-managed object model
//!
//! This module defines the header prefixed to every object and the type
//! table that describes payload layouts.

pub mod header;
pub mod refmap;
pub mod types;

pub use header::{header_of, Generation, ObjectHeader, ObjectRef, HEADER_SIZE, OBJECT_ALIGNMENT};
pub use refmap::ReferenceMap;
pub use types::{AuxMode, TypeId, TypeInfo, TypeTable};
