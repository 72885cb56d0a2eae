//! Root Providers - how the embedding runtime hands roots to the collector
//!
//! The collector never walks native stacks. Everything it treats as a root
//! comes from a [`RootProvider`], which also receives the rewritten handle
//! when a rooted object is relocated.
//!
//! # Root Sources
//!
//! 1. **Plain collections** - `Vec<ObjectRef>`, arrays and slices
//! 2. **Named globals** - [`RootSet`]
//! 3. **Shadow stack** - [`ShadowStack`], pushed and popped by compiled code

use crate::object::ObjectRef;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Supplier of root slots
///
/// `visit_roots` must present the same slots, in the same order, every time
/// it is called during one cycle. The visitor may overwrite a slot with the
/// object's new handle.
pub trait RootProvider {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef));
}

impl RootProvider for Vec<ObjectRef> {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        self.iter_mut().for_each(visitor);
    }
}

impl RootProvider for [ObjectRef] {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        self.iter_mut().for_each(visitor);
    }
}

impl<const N: usize> RootProvider for [ObjectRef; N] {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        self.iter_mut().for_each(visitor);
    }
}

impl<T: RootProvider + ?Sized> RootProvider for &mut T {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        (**self).visit_roots(visitor);
    }
}

/// Snapshot of the handles a provider currently presents
pub fn collect_roots(provider: &mut dyn RootProvider) -> Vec<ObjectRef> {
    let mut roots = Vec::new();
    provider.visit_roots(&mut |slot| roots.push(*slot));
    roots
}

/// Two providers visited back to back
pub(crate) struct ChainedRoots<'a> {
    pub first: &'a mut dyn RootProvider,
    pub second: Option<&'a mut Box<dyn RootProvider + Send>>,
}

impl RootProvider for ChainedRoots<'_> {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        self.first.visit_roots(visitor);
        if let Some(second) = self.second.as_mut() {
            second.visit_roots(visitor);
        }
    }
}

/// Named global roots
///
/// ```rust
/// use kgc::{ObjectRef, RootProvider, RootSet};
///
/// let obj = ObjectRef::from_addr(0x1000).unwrap();
/// let mut roots = RootSet::new();
/// roots.register("main_module", obj);
/// assert_eq!(roots.get("main_module"), Some(obj));
/// ```
#[derive(Debug, Default, Clone)]
pub struct RootSet {
    roots: IndexMap<String, ObjectRef>,
}

impl RootSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a named root; returns the handle it replaced
    pub fn register(&mut self, name: impl Into<String>, obj: ObjectRef) -> Option<ObjectRef> {
        self.roots.insert(name.into(), obj)
    }

    pub fn unregister(&mut self, name: &str) -> Option<ObjectRef> {
        self.roots.shift_remove(name)
    }

    /// Current handle of a named root
    pub fn get(&self, name: &str) -> Option<ObjectRef> {
        self.roots.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

impl RootProvider for RootSet {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        self.roots.values_mut().for_each(visitor);
    }
}

/// LIFO stack of root slots maintained by generated code
///
/// Clones share the same slots, so one handle can be installed in the
/// collector while the runtime keeps pushing and popping through another.
#[derive(Debug, Default, Clone)]
pub struct ShadowStack {
    slots: Arc<Mutex<Vec<ObjectRef>>>,
}

impl ShadowStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a root; returns its slot index
    pub fn push(&self, obj: ObjectRef) -> usize {
        let mut slots = self.slots.lock();
        slots.push(obj);
        slots.len() - 1
    }

    pub fn pop(&self) -> Option<ObjectRef> {
        self.slots.lock().pop()
    }

    /// Current handle in a slot (it changes when the object moves)
    pub fn get(&self, index: usize) -> Option<ObjectRef> {
        self.slots.lock().get(index).copied()
    }

    /// Overwrite a slot; false if out of range
    pub fn set(&self, index: usize, obj: ObjectRef) -> bool {
        match self.slots.lock().get_mut(index) {
            Some(slot) => {
                *slot = obj;
                true
            },
            None => false,
        }
    }

    /// Drop every slot above `depth` (frame exit)
    pub fn truncate(&self, depth: usize) {
        self.slots.lock().truncate(depth);
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

impl RootProvider for ShadowStack {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ObjectRef)) {
        self.slots.lock().iter_mut().for_each(visitor);
    }
}
