//! Mark Stack - LIFO work list for depth-first marking
//!
//! Entries are grey candidates: an object may sit on the stack more than
//! once and is skipped when popped if it was marked in the meantime.

use crate::object::ObjectRef;

/// MarkStack - explicit stack replacing recursion
#[derive(Debug, Default)]
pub struct MarkStack {
    stack: Vec<ObjectRef>,
    pushed: usize,
    max_depth: usize,
}

impl MarkStack {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, obj: ObjectRef) {
        self.stack.push(obj);
        self.pushed += 1;
        self.max_depth = self.max_depth.max(self.stack.len());
    }

    /// Push in reverse so the first item is popped first
    pub fn push_in_order(&mut self, objs: &[ObjectRef]) {
        for &obj in objs.iter().rev() {
            self.push(obj);
        }
    }

    #[inline]
    pub fn pop(&mut self) -> Option<ObjectRef> {
        self.stack.pop()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Total pushes since creation
    pub fn pushed_count(&self) -> usize {
        self.pushed
    }

    /// Deepest the stack has been
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}
