//! GC Timer - Timing Utilities
//!
//! Measures collection phases with a monotonic clock.

use std::time::{Duration, Instant};

/// GcTimer - timer for measuring GC operations
#[derive(Debug, Clone, Copy)]
pub struct GcTimer {
    start: Instant,
}

impl GcTimer {
    /// Create new timer
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get elapsed microseconds
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed().as_micros() as u64
    }

    /// Get elapsed milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }

    /// Elapsed milliseconds since the last lap, restarting the timer
    pub fn lap_ms(&mut self) -> f64 {
        let ms = self.elapsed_ms();
        self.start = Instant::now();
        ms
    }
}

impl Default for GcTimer {
    fn default() -> Self {
        Self::new()
    }
}
