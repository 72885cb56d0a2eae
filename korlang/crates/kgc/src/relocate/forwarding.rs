//! Forwarding Table - Address Mapping During Relocation
//!
//! Records `old -> new` for every object moved in one phase (promotion or
//! compaction). After the phase, every reference on record is passed
//! through [`ForwardingTable::resolve`].

use crate::object::ObjectRef;
use indexmap::IndexMap;

/// ForwardingTable - mapping old handles to new handles
#[derive(Debug, Default)]
pub struct ForwardingTable {
    entries: IndexMap<ObjectRef, ObjectRef>,
    bytes_moved: usize,
}

impl ForwardingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a move
    ///
    /// Self-moves and second moves of the same object are rejected with a
    /// warning; the first record wins.
    pub fn record(&mut self, from: ObjectRef, to: ObjectRef) {
        if from == to {
            log::warn!("forwarding: ignoring self-move of {:?}", from);
            return;
        }
        if let Some(existing) = self.entries.get(&from) {
            log::warn!(
                "forwarding: {:?} already moved to {:?}, ignoring {:?}",
                from,
                existing,
                to
            );
            return;
        }
        self.entries.insert(from, to);
    }

    /// Record a move of `footprint` bytes
    pub fn record_move(&mut self, from: ObjectRef, to: ObjectRef, footprint: usize) {
        let before = self.entries.len();
        self.record(from, to);
        if self.entries.len() > before {
            self.bytes_moved += footprint;
        }
    }

    /// New handle for a moved object
    #[inline]
    pub fn lookup(&self, from: ObjectRef) -> Option<ObjectRef> {
        self.entries.get(&from).copied()
    }

    /// New handle if moved, otherwise `obj` itself
    #[inline]
    pub fn resolve(&self, obj: ObjectRef) -> ObjectRef {
        self.lookup(obj).unwrap_or(obj)
    }

    /// Same as `resolve`, for a raw slot value (0 stays 0)
    #[inline]
    pub fn resolve_raw(&self, raw: usize) -> usize {
        ObjectRef::from_addr(raw).map_or(0, |obj| self.resolve(obj).addr())
    }

    /// New handles in recording order
    pub fn destinations(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.entries.values().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bytes_moved(&self) -> usize {
        self.bytes_moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(addr: usize) -> ObjectRef {
        ObjectRef::from_addr(addr).unwrap()
    }

    #[test]
    fn test_record_and_resolve() {
        let mut table = ForwardingTable::new();
        table.record_move(obj(0x100), obj(0x800), 48);

        assert_eq!(table.lookup(obj(0x100)), Some(obj(0x800)));
        assert_eq!(table.resolve(obj(0x200)), obj(0x200));
        assert_eq!(table.resolve_raw(0x100), 0x800);
        assert_eq!(table.resolve_raw(0), 0);
        assert_eq!(table.bytes_moved(), 48);
    }

    #[test]
    fn test_first_record_wins() {
        let mut table = ForwardingTable::new();
        table.record_move(obj(0x100), obj(0x800), 32);
        table.record_move(obj(0x100), obj(0x900), 32);
        table.record(obj(0x300), obj(0x300));

        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve(obj(0x100)), obj(0x800));
        assert_eq!(table.bytes_moved(), 32);
    }
}
