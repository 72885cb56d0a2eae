//! Type Table - registered object layouts
//!
//! Entries are append-only: a `TypeId` handed out once resolves for the life
//! of the collector. Changing a layout means registering a new entry with
//! [`TypeTable::supersede`]; objects allocated under the old id keep their
//! old layout.

use super::refmap::ReferenceMap;
use crate::error::{KgcError, Result};
use indexmap::IndexMap;
use std::fmt;

/// Stable index into the type table
///
/// Raw value 0 is never handed out, so a zeroed header is always rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(u64);

impl TypeId {
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        TypeId(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How the header's `aux` word is interpreted for instances of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
pub enum AuxMode {
    /// Plain traced object; `aux` unused
    #[default]
    Traced,
    /// `aux` is an atomic reference count held by native code
    Arc,
    /// `aux` is an opaque handle to storage owned outside the heap
    OffHeap,
}

/// Layout and behavior of one object type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub name: String,
    /// Default payload size in bytes
    pub size: usize,
    pub refs: ReferenceMap,
    pub has_finalizer: bool,
    pub aux_mode: AuxMode,
}

impl TypeInfo {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            refs: ReferenceMap::empty(),
            has_finalizer: false,
            aux_mode: AuxMode::Traced,
        }
    }

    pub fn with_refs(mut self, offsets: &[usize]) -> Self {
        self.refs = ReferenceMap::new(offsets);
        self
    }

    pub fn with_finalizer(mut self) -> Self {
        self.has_finalizer = true;
        self
    }

    pub fn with_aux_mode(mut self, mode: AuxMode) -> Self {
        self.aux_mode = mode;
        self
    }

    fn validate(&self) -> Result<()> {
        self.refs.validate(self.size)
    }
}

/// Append-only registry of object types
#[derive(Debug, Default)]
pub struct TypeTable {
    entries: Vec<TypeInfo>,
    superseded: IndexMap<TypeId, TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a layout and return its id
    pub fn register(&mut self, info: TypeInfo) -> Result<TypeId> {
        info.validate()?;
        self.entries.push(info);
        Ok(TypeId::from_raw(self.entries.len() as u64))
    }

    /// Register `info` as the replacement for `old`
    ///
    /// `old` keeps resolving for existing instances.
    pub fn supersede(&mut self, old: TypeId, info: TypeInfo) -> Result<TypeId> {
        self.get(old)?;
        let new = self.register(info)?;
        self.superseded.insert(old, new);
        log::debug!("type {} superseded by {}", old, new);
        Ok(new)
    }

    /// Resolve an id
    pub fn get(&self, type_id: TypeId) -> Result<&TypeInfo> {
        let index = type_id.as_raw().checked_sub(1);
        index
            .and_then(|i| self.entries.get(i as usize))
            .ok_or(KgcError::TypeNotRegistered { type_id })
    }

    #[inline]
    pub fn contains(&self, type_id: TypeId) -> bool {
        self.get(type_id).is_ok()
    }

    /// Follow the supersession chain to the current layout id
    pub fn current(&self, type_id: TypeId) -> TypeId {
        let mut id = type_id;
        while let Some(&next) = self.superseded.get(&id) {
            id = next;
        }
        id
    }

    #[inline]
    pub fn is_superseded(&self, type_id: TypeId) -> bool {
        self.superseded.contains_key(&type_id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
