//! Cycle Report - what one collection did

use crate::bridge::OffHeapHandle;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Collection kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CycleKind {
    /// Young generation only
    Minor,
    /// Both generations, with optional old compaction
    Major,
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleKind::Minor => f.write_str("minor"),
            CycleKind::Major => f.write_str("major"),
        }
    }
}

/// Why a collection ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GcReason {
    /// Requested by the embedding runtime
    Explicit,
    /// Young occupancy crossed the minor watermark
    Watermark,
    /// No block fit the allocation request
    AllocationFailure,
    /// Old occupancy crossed the major watermark after a minor cycle
    OldWatermark,
    /// Closing an incremental major cycle
    Incremental,
}

impl fmt::Display for GcReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GcReason::Explicit => "explicit",
            GcReason::Watermark => "watermark",
            GcReason::AllocationFailure => "allocation failure",
            GcReason::OldWatermark => "old watermark",
            GcReason::Incremental => "incremental",
        };
        f.write_str(name)
    }
}

/// Result of one collection cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub kind: CycleKind,
    pub reason: GcReason,
    /// Objects found reachable
    pub marked_objects: usize,
    pub reclaimed_objects: usize,
    pub reclaimed_bytes: usize,
    pub promoted_objects: usize,
    pub promoted_bytes: usize,
    /// Survivors past the threshold that did not fit the old generation
    pub promotion_failures: usize,
    pub finalizers_queued: usize,
    /// Finalized objects found reachable again
    pub resurrected: usize,
    /// Old objects slid by compaction
    pub compacted_objects: usize,
    /// Handles of off-heap shells reclaimed this cycle
    pub detached_off_heap: Vec<OffHeapHandle>,
    pub duration: Duration,
}

impl CycleReport {
    pub fn new(cycle: u64, kind: CycleKind, reason: GcReason) -> Self {
        Self {
            cycle,
            kind,
            reason,
            marked_objects: 0,
            reclaimed_objects: 0,
            reclaimed_bytes: 0,
            promoted_objects: 0,
            promoted_bytes: 0,
            promotion_failures: 0,
            finalizers_queued: 0,
            resurrected: 0,
            compacted_objects: 0,
            detached_off_heap: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Fold a nested cycle (a major run after a triggered minor) into this one
    pub fn absorb(&mut self, other: CycleReport) {
        self.marked_objects = other.marked_objects;
        self.reclaimed_objects += other.reclaimed_objects;
        self.reclaimed_bytes += other.reclaimed_bytes;
        self.promoted_objects += other.promoted_objects;
        self.promoted_bytes += other.promoted_bytes;
        self.promotion_failures += other.promotion_failures;
        self.finalizers_queued += other.finalizers_queued;
        self.resurrected += other.resurrected;
        self.compacted_objects += other.compacted_objects;
        self.detached_off_heap.extend(other.detached_off_heap);
        self.duration += other.duration;
    }
}
