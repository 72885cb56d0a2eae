//! Histogram - Pause Time Histogram
//!
//! Logarithmic buckets for pause time distribution (P50, P95, P99).

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Histogram - pause time histogram
pub struct Histogram {
    /// Bucket counts keyed by bit length of the value
    buckets: Mutex<BTreeMap<u32, u64>>,
    count: AtomicU64,
    sum: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
}

impl Histogram {
    /// Create new histogram
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(BTreeMap::new()),
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
        }
    }

    /// Record value
    pub fn record(&self, value: u64) {
        *self.buckets.lock().entry(Self::bucket(value)).or_insert(0) += 1;

        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.min.fetch_min(value, Ordering::Relaxed);
        self.max.fetch_max(value, Ordering::Relaxed);
    }

    fn bucket(value: u64) -> u32 {
        64 - value.leading_zeros()
    }

    /// Upper bound of the bucket holding the `p` quantile
    pub fn percentile(&self, p: f64) -> u64 {
        let total = self.count.load(Ordering::Relaxed);
        if total == 0 {
            return 0;
        }

        let target = ((total as f64 * p).ceil() as u64).max(1);
        let buckets = self.buckets.lock();
        let mut cumulative = 0;

        for (&bucket, &count) in buckets.iter() {
            cumulative += count;
            if cumulative >= target {
                return Self::bucket_limit(bucket);
            }
        }

        buckets
            .last_key_value()
            .map_or(0, |(&bucket, _)| Self::bucket_limit(bucket))
    }

    fn bucket_limit(bucket: u32) -> u64 {
        if bucket == 0 {
            0
        } else if bucket >= 64 {
            u64::MAX
        } else {
            (1u64 << bucket) - 1
        }
    }

    pub fn p50(&self) -> u64 {
        self.percentile(0.50)
    }

    pub fn p95(&self) -> u64 {
        self.percentile(0.95)
    }

    pub fn p99(&self) -> u64 {
        self.percentile(0.99)
    }

    /// Get mean
    pub fn mean(&self) -> u64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0;
        }
        self.sum.load(Ordering::Relaxed) / count
    }

    /// Get min
    pub fn min(&self) -> u64 {
        let min = self.min.load(Ordering::Relaxed);
        if min == u64::MAX {
            0
        } else {
            min
        }
    }

    /// Get max
    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    /// Get count
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Clear histogram
    pub fn clear(&self) {
        self.buckets.lock().clear();
        self.count.store(0, Ordering::Relaxed);
        self.sum.store(0, Ordering::Relaxed);
        self.min.store(u64::MAX, Ordering::Relaxed);
        self.max.store(0, Ordering::Relaxed);
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}
