//! Marker Module - Reachability Tracing
//!
//! Depth-first marking from explicit roots over the reference slots the
//! type table declares.
//!
//! Marking Algorithm:
//! - Tri-color: white = unmarked, grey = on the mark stack, black = marked
//! - Objects are marked when popped, so the visit order is a true preorder:
//!   seeds in order, children in ascending slot offset
//! - Minor scope marks only young objects; old objects count as live and
//!   their edges into the young generation come from the remembered set
//!
//! Seeds, in visit order:
//! 1. Roots from the [`RootProvider`]
//! 2. ARC objects with a nonzero count, by address
//! 3. Young referents of remembered old objects (minor scope)
//! 4. Referents of pinned and finalizer-held objects, which stay unmarked
//!    themselves

pub mod mark_stack;
pub mod roots;

pub use mark_stack::MarkStack;
pub use roots::{collect_roots, RootProvider, RootSet, ShadowStack};

use crate::bridge;
use crate::error::{KgcError, Result};
use crate::heap::{load_slot, Heap};
use crate::object::{Generation, ObjectRef, TypeTable};
use indexmap::IndexSet;

/// Which objects a trace may mark
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkScope {
    /// Young generation only
    Young,
    /// Both generations
    Full,
}

/// Marker - tracing state, kept between incremental steps
#[derive(Debug)]
pub struct Marker {
    scope: MarkScope,
    stack: MarkStack,
    /// Marked objects in visit order
    marked: IndexSet<ObjectRef>,
}

impl Marker {
    pub fn new(scope: MarkScope) -> Self {
        Self {
            scope,
            stack: MarkStack::new(),
            marked: IndexSet::new(),
        }
    }

    #[inline]
    pub fn scope(&self) -> MarkScope {
        self.scope
    }

    #[inline]
    pub fn in_scope(&self, heap: &Heap, obj: ObjectRef) -> bool {
        match self.scope {
            MarkScope::Young => heap.locate(obj.addr()) == Some(Generation::Young),
            MarkScope::Full => heap.is_object(obj),
        }
    }

    fn is_white(&self, heap: &Heap, obj: ObjectRef) -> bool {
        self.in_scope(heap, obj) && heap.header(obj).map_or(false, |h| !h.is_marked())
    }

    /// Grey a single object (write barrier entry point)
    pub fn shade(&mut self, heap: &Heap, obj: ObjectRef) {
        if self.is_white(heap, obj) {
            self.stack.push(obj);
        }
    }

    /// Grey seeds so they are visited in the given order
    pub fn seed(&mut self, heap: &Heap, seeds: &[ObjectRef]) {
        let white: Vec<ObjectRef> = seeds
            .iter()
            .copied()
            .filter(|&obj| self.is_white(heap, obj))
            .collect();
        self.stack.push_in_order(&white);
    }

    /// Mark a freshly allocated object black
    pub fn mark_black(&mut self, heap: &Heap, obj: ObjectRef) -> Result<()> {
        heap.header(obj)?.set_marked();
        self.marked.insert(obj);
        Ok(())
    }

    /// Mark up to `budget` objects; returns true once no grey objects remain
    pub fn step(&mut self, heap: &Heap, types: &TypeTable, budget: usize) -> Result<bool> {
        let mut done = 0;
        while done < budget {
            let Some(obj) = self.stack.pop() else {
                return Ok(true);
            };
            let header = heap
                .header(obj)
                .map_err(|_| KgcError::corrupt(obj.addr(), "grey object is not live"))?;
            if header.set_marked() {
                continue;
            }
            self.marked.insert(obj);
            done += 1;

            let kids = children(heap, types, obj)?;
            self.seed(heap, &kids);
        }
        Ok(self.stack.is_empty())
    }

    /// Mark until no grey objects remain
    pub fn finish(&mut self, heap: &Heap, types: &TypeTable) -> Result<()> {
        self.step(heap, types, usize::MAX).map(|_| ())
    }

    #[inline]
    pub fn is_drained(&self) -> bool {
        self.stack.is_empty()
    }

    /// Marked objects in visit order
    pub fn marked(&self) -> &IndexSet<ObjectRef> {
        &self.marked
    }

    pub fn into_marked(self) -> IndexSet<ObjectRef> {
        self.marked
    }

    pub fn stack(&self) -> &MarkStack {
        &self.stack
    }
}

/// Referents of `obj` in ascending slot offset
pub fn children(heap: &Heap, types: &TypeTable, obj: ObjectRef) -> Result<Vec<ObjectRef>> {
    let header = heap.header(obj)?;
    let info = types.get(header.type_id()).map_err(|_| {
        KgcError::corrupt(
            obj.addr(),
            format!("unregistered type {}", header.type_id()),
        )
    })?;

    let mut kids = Vec::with_capacity(info.refs.count());
    for offset in info.refs.iter() {
        if offset + 8 > header.size() {
            return Err(KgcError::corrupt(
                obj.addr(),
                format!("slot +{} outside payload of {} bytes", offset, header.size()),
            ));
        }
        // SAFETY: the slot lies inside the live object's payload.
        let raw = unsafe { load_slot(obj, offset) };
        if let Some(kid) = heap.resolve_slot(obj, offset, raw)? {
            kids.push(kid);
        }
    }
    Ok(kids)
}

/// Seed list for a trace, in visit order
///
/// `remembered` is only consulted in young scope; `secondary` lists pinned
/// and finalizer-held objects whose referents must survive.
pub fn gather_seeds(
    heap: &Heap,
    types: &TypeTable,
    scope: MarkScope,
    roots: &[ObjectRef],
    remembered: &[ObjectRef],
    secondary: &[ObjectRef],
) -> Result<Vec<ObjectRef>> {
    let mut seeds = roots.to_vec();

    let spaces: &[Generation] = match scope {
        MarkScope::Young => &[Generation::Young],
        MarkScope::Full => &[Generation::Young, Generation::Old],
    };
    let mut retained = Vec::new();
    for &gen in spaces {
        for addr in heap.space(gen).objects() {
            let Some(obj) = ObjectRef::from_addr(addr) else {
                continue;
            };
            let header = heap.header(obj)?;
            let mode = types
                .get(header.type_id())
                .map_err(|_| KgcError::corrupt(addr, "unregistered type"))?
                .aux_mode;
            if bridge::is_retained(header, mode) {
                retained.push(obj);
            }
        }
    }
    retained.sort_unstable();
    seeds.extend(retained);

    if scope == MarkScope::Young {
        for &old in remembered {
            seeds.extend(children(heap, types, old)?);
        }
    }

    for &holder in secondary {
        seeds.extend(children(heap, types, holder)?);
    }

    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::heap::store_slot;
    use crate::object::{ObjectHeader, TypeId, TypeInfo};

    struct Graph {
        heap: Heap,
        types: TypeTable,
        node: TypeId,
    }

    impl Graph {
        fn new() -> Self {
            let config = GcConfig {
                young_capacity: 8192,
                old_capacity: 8192,
                ..Default::default()
            };
            let mut types = TypeTable::new();
            let node = types
                .register(TypeInfo::new("node", 16).with_refs(&[0, 8]))
                .unwrap();
            Self {
                heap: Heap::new(&config).unwrap(),
                types,
                node,
            }
        }

        fn alloc(&mut self, gen: Generation) -> ObjectRef {
            let space = self.heap.space_mut(gen);
            let addr = space.allocate(ObjectHeader::footprint(16).unwrap()).unwrap();
            let header = ObjectHeader::new(self.node, 16, false);
            if gen == Generation::Old {
                header.promote();
            }
            space.install(addr, header);
            ObjectRef::from_addr(addr).unwrap()
        }

        fn link(&self, from: ObjectRef, offset: usize, to: ObjectRef) {
            unsafe { store_slot(from, offset, to.addr()) };
        }

        fn trace(&self, scope: MarkScope, roots: &[ObjectRef]) -> Vec<ObjectRef> {
            let mut marker = Marker::new(scope);
            let seeds = gather_seeds(&self.heap, &self.types, scope, roots, &[], &[]).unwrap();
            marker.seed(&self.heap, &seeds);
            marker.finish(&self.heap, &self.types).unwrap();
            marker.into_marked().into_iter().collect()
        }
    }

    #[test]
    fn test_preorder_visit() {
        let mut g = Graph::new();
        let a = g.alloc(Generation::Young);
        let b = g.alloc(Generation::Young);
        let c = g.alloc(Generation::Young);
        let d = g.alloc(Generation::Young);
        g.link(a, 0, b);
        g.link(a, 8, c);
        g.link(b, 0, d);

        assert_eq!(g.trace(MarkScope::Full, &[a]), vec![a, b, d, c]);
    }

    #[test]
    fn test_cycle_terminates() {
        let mut g = Graph::new();
        let a = g.alloc(Generation::Young);
        let b = g.alloc(Generation::Young);
        g.link(a, 0, b);
        g.link(b, 0, a);

        assert_eq!(g.trace(MarkScope::Full, &[a, b]), vec![a, b]);
    }

    #[test]
    fn test_young_scope_stops_at_old() {
        let mut g = Graph::new();
        let young = g.alloc(Generation::Young);
        let old = g.alloc(Generation::Old);
        let behind = g.alloc(Generation::Young);
        g.link(young, 0, old);
        g.link(old, 0, behind);

        assert_eq!(g.trace(MarkScope::Young, &[young]), vec![young]);
        assert!(!g.heap.header(old).unwrap().is_marked());
    }

    #[test]
    fn test_budgeted_steps() {
        let mut g = Graph::new();
        let a = g.alloc(Generation::Young);
        let b = g.alloc(Generation::Young);
        let c = g.alloc(Generation::Young);
        g.link(a, 0, b);
        g.link(b, 0, c);

        let mut marker = Marker::new(MarkScope::Full);
        marker.seed(&g.heap, &[a]);
        assert!(!marker.step(&g.heap, &g.types, 1).unwrap());
        assert!(!marker.step(&g.heap, &g.types, 1).unwrap());
        assert!(marker.step(&g.heap, &g.types, 5).unwrap());
        assert_eq!(marker.marked().len(), 3);
    }

    #[test]
    fn test_dangling_slot_is_corruption() {
        let mut g = Graph::new();
        let a = g.alloc(Generation::Young);
        unsafe { store_slot(a, 8, 0xdead_0000) };

        let mut marker = Marker::new(MarkScope::Full);
        marker.seed(&g.heap, &[a]);
        let err = marker.finish(&g.heap, &g.types).unwrap_err();
        assert!(matches!(err, KgcError::CorruptHeader { address, .. } if address == a.addr()));
    }
}
