//! Stats Module - GC Performance Monitoring
//!
//! Metrics:
//! - Pause time (min, max, avg, percentiles, recent timeline)
//! - Cycle counts per kind
//! - Reclaimed, promoted and allocated volume
//! - Finalizer traffic

pub mod cycle;
pub mod histogram;
pub mod timer;

pub use cycle::{CycleKind, CycleReport, GcReason};
pub use histogram::Histogram;
pub use timer::GcTimer;

use crate::util::constants::PAUSE_WINDOW;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// GcStats - statistics collector for GC
pub struct GcStats {
    minor_cycles: AtomicU64,
    major_cycles: AtomicU64,
    objects_reclaimed: AtomicU64,
    bytes_reclaimed: AtomicU64,
    objects_promoted: AtomicU64,
    bytes_promoted: AtomicU64,
    finalizers_queued: AtomicU64,
    finalizers_completed: AtomicU64,
    bytes_allocated: AtomicU64,
    /// Pause time in nanoseconds
    pause_stats: Histogram,
    /// Most recent pauses, oldest first
    recent_pauses: Mutex<VecDeque<Duration>>,
    start_time: Instant,
}

impl GcStats {
    /// Create new stats collector
    pub fn new() -> Self {
        Self {
            minor_cycles: AtomicU64::new(0),
            major_cycles: AtomicU64::new(0),
            objects_reclaimed: AtomicU64::new(0),
            bytes_reclaimed: AtomicU64::new(0),
            objects_promoted: AtomicU64::new(0),
            bytes_promoted: AtomicU64::new(0),
            finalizers_queued: AtomicU64::new(0),
            finalizers_completed: AtomicU64::new(0),
            bytes_allocated: AtomicU64::new(0),
            pause_stats: Histogram::new(),
            recent_pauses: Mutex::new(VecDeque::with_capacity(PAUSE_WINDOW)),
            start_time: Instant::now(),
        }
    }

    /// Record a finished collection
    pub fn record_cycle(&self, report: &CycleReport) {
        match report.kind {
            CycleKind::Minor => self.minor_cycles.fetch_add(1, Ordering::Relaxed),
            CycleKind::Major => self.major_cycles.fetch_add(1, Ordering::Relaxed),
        };

        self.objects_reclaimed
            .fetch_add(report.reclaimed_objects as u64, Ordering::Relaxed);
        self.bytes_reclaimed
            .fetch_add(report.reclaimed_bytes as u64, Ordering::Relaxed);
        self.objects_promoted
            .fetch_add(report.promoted_objects as u64, Ordering::Relaxed);
        self.bytes_promoted
            .fetch_add(report.promoted_bytes as u64, Ordering::Relaxed);
        self.finalizers_queued
            .fetch_add(report.finalizers_queued as u64, Ordering::Relaxed);

        self.record_pause(report.duration);
    }

    /// Record a stop-the-world pause
    pub fn record_pause(&self, pause: Duration) {
        self.pause_stats.record(pause.as_nanos() as u64);

        let mut recent = self.recent_pauses.lock();
        if recent.len() == PAUSE_WINDOW {
            recent.pop_front();
        }
        recent.push_back(pause);
    }

    pub fn record_allocation(&self, bytes: usize) {
        self.bytes_allocated
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_finalizer_completed(&self) {
        self.finalizers_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Average of the recent pause window
    pub fn average_pause(&self) -> Duration {
        let recent = self.recent_pauses.lock();
        if recent.is_empty() {
            return Duration::ZERO;
        }
        recent.iter().sum::<Duration>() / recent.len() as u32
    }

    /// Recent pauses, oldest first
    pub fn pause_timeline(&self) -> Vec<Duration> {
        self.recent_pauses.lock().iter().copied().collect()
    }

    /// Get pause time histogram
    pub fn pause_histogram(&self) -> &Histogram {
        &self.pause_stats
    }

    /// Get summary statistics
    pub fn summary(&self) -> GcSummary {
        let minor = self.minor_cycles.load(Ordering::Relaxed);
        let major = self.major_cycles.load(Ordering::Relaxed);
        GcSummary {
            total_cycles: minor + major,
            minor_cycles: minor,
            major_cycles: major,
            objects_reclaimed: self.objects_reclaimed.load(Ordering::Relaxed),
            bytes_reclaimed: self.bytes_reclaimed.load(Ordering::Relaxed),
            objects_promoted: self.objects_promoted.load(Ordering::Relaxed),
            bytes_promoted: self.bytes_promoted.load(Ordering::Relaxed),
            finalizers_queued: self.finalizers_queued.load(Ordering::Relaxed),
            finalizers_completed: self.finalizers_completed.load(Ordering::Relaxed),
            bytes_allocated: self.bytes_allocated.load(Ordering::Relaxed),
            avg_pause_ms: self.pause_stats.mean() as f64 / 1_000_000.0,
            max_pause_ms: self.pause_stats.max() as f64 / 1_000_000.0,
            p99_pause_ms: self.pause_stats.p99() as f64 / 1_000_000.0,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Reset statistics
    pub fn reset(&self) {
        for counter in [
            &self.minor_cycles,
            &self.major_cycles,
            &self.objects_reclaimed,
            &self.bytes_reclaimed,
            &self.objects_promoted,
            &self.bytes_promoted,
            &self.finalizers_queued,
            &self.finalizers_completed,
            &self.bytes_allocated,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.pause_stats.clear();
        self.recent_pauses.lock().clear();
    }
}

impl Default for GcStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GcSummary {
    pub total_cycles: u64,
    pub minor_cycles: u64,
    pub major_cycles: u64,
    pub objects_reclaimed: u64,
    pub bytes_reclaimed: u64,
    pub objects_promoted: u64,
    pub bytes_promoted: u64,
    pub finalizers_queued: u64,
    pub finalizers_completed: u64,
    pub bytes_allocated: u64,
    /// Average pause time (ms)
    pub avg_pause_ms: f64,
    /// Max pause time (ms)
    pub max_pause_ms: f64,
    /// P99 pause bucket bound (ms)
    pub p99_pause_ms: f64,
    pub uptime_secs: u64,
}
