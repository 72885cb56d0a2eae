//! Finalizer Queue - per-object finalization state machine
//!
//! ```text
//! Unfinalized ──(unreachable)──▶ Queued ──next_finalizable──▶ Finalizing
//!      ▲                                                          │
//!      │ (marked again)                                complete_finalization
//!      │                                                          ▼
//!      └────────────────────────────────────────────────── Reclaimable
//!                                                                 │
//!                                                      (unmarked) ▼
//!                                                               freed
//! ```
//!
//! Objects in `Queued` or `Finalizing` are held: they are never moved or
//! reclaimed, and their referents are kept alive for the finalizer to see.
//! The queue only tracks objects that left `Unfinalized`.

use crate::error::{KgcError, Result};
use crate::object::ObjectRef;
use crate::relocate::ForwardingTable;
use indexmap::IndexMap;
use std::collections::VecDeque;

/// Finalization state of a finalizable object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinalizerState {
    Unfinalized,
    Queued,
    Finalizing,
    Reclaimable,
}

impl FinalizerState {
    pub fn as_str(self) -> &'static str {
        match self {
            FinalizerState::Unfinalized => "Unfinalized",
            FinalizerState::Queued => "Queued",
            FinalizerState::Finalizing => "Finalizing",
            FinalizerState::Reclaimable => "Reclaimable",
        }
    }

    /// Queued or Finalizing
    #[inline]
    pub fn is_held(self) -> bool {
        matches!(self, FinalizerState::Queued | FinalizerState::Finalizing)
    }
}

/// Queue of objects awaiting or undergoing finalization
#[derive(Debug, Default)]
pub struct FinalizerQueue {
    states: IndexMap<ObjectRef, FinalizerState>,
    /// Queued objects in discovery order
    pending: VecDeque<ObjectRef>,
}

impl FinalizerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, obj: ObjectRef) -> FinalizerState {
        self.states
            .get(&obj)
            .copied()
            .unwrap_or(FinalizerState::Unfinalized)
    }

    #[inline]
    pub fn is_held(&self, obj: ObjectRef) -> bool {
        self.state(obj).is_held()
    }

    /// Held objects, in queue-entry order
    pub fn held(&self) -> Vec<ObjectRef> {
        self.states
            .iter()
            .filter(|(_, state)| state.is_held())
            .map(|(&obj, _)| obj)
            .collect()
    }

    /// Objects finalized and waiting to be found unreachable again
    pub fn reclaimable(&self) -> Vec<ObjectRef> {
        self.states
            .iter()
            .filter(|(_, &state)| state == FinalizerState::Reclaimable)
            .map(|(&obj, _)| obj)
            .collect()
    }

    /// Unfinalized -> Queued
    pub fn enqueue(&mut self, obj: ObjectRef) -> Result<()> {
        self.transition(obj, FinalizerState::Unfinalized, FinalizerState::Queued)?;
        self.pending.push_back(obj);
        Ok(())
    }

    /// Queued -> Finalizing for the oldest queued object
    pub fn next(&mut self) -> Option<ObjectRef> {
        let obj = self.pending.pop_front()?;
        self.states.insert(obj, FinalizerState::Finalizing);
        Some(obj)
    }

    /// Finalizing -> Reclaimable
    pub fn complete(&mut self, obj: ObjectRef) -> Result<()> {
        self.transition(obj, FinalizerState::Finalizing, FinalizerState::Reclaimable)
    }

    /// Reclaimable -> Unfinalized, for an object reachable again
    pub fn resurrect(&mut self, obj: ObjectRef) -> Result<()> {
        self.transition(obj, FinalizerState::Reclaimable, FinalizerState::Unfinalized)
    }

    /// Drop bookkeeping for a reclaimed object
    pub fn forget(&mut self, obj: ObjectRef) {
        self.states.shift_remove(&obj);
    }

    fn transition(
        &mut self,
        obj: ObjectRef,
        from: FinalizerState,
        to: FinalizerState,
    ) -> Result<()> {
        let actual = self.state(obj);
        if actual != from {
            return Err(KgcError::FinalizerState {
                address: obj.addr(),
                expected: from.as_str(),
                actual: actual.as_str(),
            });
        }
        if to == FinalizerState::Unfinalized {
            self.states.shift_remove(&obj);
        } else {
            self.states.insert(obj, to);
        }
        Ok(())
    }

    /// Rewrite entries for objects the collector moved
    pub fn rewrite(&mut self, forwarding: &ForwardingTable) {
        if forwarding.is_empty() {
            return;
        }
        self.states = self
            .states
            .drain(..)
            .map(|(obj, state)| (forwarding.resolve(obj), state))
            .collect();
        for obj in self.pending.iter_mut() {
            *obj = forwarding.resolve(*obj);
        }
    }

    /// Number of objects waiting for `next`
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Objects tracked in any state other than Unfinalized
    #[inline]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
