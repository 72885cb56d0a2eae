//! Adaptive Minor Trigger - tuning the young-generation watermark
//!
//! The configured `minor_watermark` is only the starting point. After every
//! minor cycle the controller compares the bytes left in the young
//! generation with the current trigger and looks at whole-heap pressure:
//!
//! | Condition                                   | New trigger               |
//! |---------------------------------------------|---------------------------|
//! | pressure > `pressure_threshold`             | trigger * `pressure_growth` |
//! | survivors > `growth_threshold` of trigger   | trigger * `growth_factor`   |
//! | survivors < `shrink_threshold` of trigger   | trigger * `shrink_factor`   |
//!
//! The trigger stays between the configured watermark and the young capacity.

use crate::config::ConfigError;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Tuning knobs for [`AdaptiveTrigger`]
#[derive(Debug, Clone)]
pub struct AdaptiveConfig {
    /// Adjust the trigger after minor cycles
    pub enabled: bool,

    /// Growth when survivors crowd the trigger
    pub growth_factor: f64,

    /// Growth while the heap is under pressure
    pub pressure_growth: f64,

    /// Survivor ratio (of the trigger) above which the trigger grows
    pub growth_threshold: f64,

    /// Survivor ratio below which the trigger shrinks back
    pub shrink_threshold: f64,

    /// Shrink applied when survivors are sparse
    pub shrink_factor: f64,

    /// Heap pressure above which growth slows to `pressure_growth`
    pub pressure_threshold: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            growth_factor: 1.5,
            pressure_growth: 1.1,
            growth_threshold: 0.7,
            shrink_threshold: 0.25,
            shrink_factor: 0.8,
            pressure_threshold: 0.9,
        }
    }
}

impl AdaptiveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.growth_factor >= 1.0 && self.pressure_growth >= 1.0) {
            return Err(ConfigError::InvalidAdaptive(
                "growth factors must be >= 1.0".to_string(),
            ));
        }
        if !(self.shrink_factor > 0.0 && self.shrink_factor <= 1.0) {
            return Err(ConfigError::InvalidAdaptive(
                "shrink_factor must be in (0.0, 1.0]".to_string(),
            ));
        }
        for (name, ratio) in [
            ("growth_threshold", self.growth_threshold),
            ("shrink_threshold", self.shrink_threshold),
            ("pressure_threshold", self.pressure_threshold),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(ConfigError::InvalidAdaptive(format!(
                    "{} must be in (0.0, 1.0]",
                    name
                )));
            }
        }
        if self.shrink_threshold >= self.growth_threshold {
            return Err(ConfigError::InvalidAdaptive(
                "shrink_threshold must be below growth_threshold".to_string(),
            ));
        }
        Ok(())
    }
}

/// Direction of a trigger change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TriggerChange {
    Grow,
    Shrink,
}

impl std::fmt::Display for TriggerChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerChange::Grow => write!(f, "grow"),
            TriggerChange::Shrink => write!(f, "shrink"),
        }
    }
}

/// One applied change of the minor trigger
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerAdjustment {
    pub previous: usize,
    pub current: usize,
    pub live_bytes: usize,
    pub pressure: f64,
    pub change: TriggerChange,
}

/// Young occupancy at which allocation schedules a minor cycle
#[derive(Debug)]
pub struct AdaptiveTrigger {
    config: AdaptiveConfig,
    floor: usize,
    ceiling: usize,
    current: AtomicUsize,
    adjustments: AtomicU64,
}

impl AdaptiveTrigger {
    /// Start at `floor`; the trigger never leaves `[floor, ceiling]`
    pub fn new(config: AdaptiveConfig, floor: usize, ceiling: usize) -> Self {
        let floor = floor.min(ceiling);
        Self {
            config,
            floor,
            ceiling,
            current: AtomicUsize::new(floor),
            adjustments: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn trigger_bytes(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    /// Changes applied so far
    pub fn adjustments(&self) -> u64 {
        self.adjustments.load(Ordering::Relaxed)
    }

    /// Retune after a minor cycle left `live_bytes` in the young generation
    ///
    /// Returns the change, or `None` when the trigger stays put.
    pub fn adjust(&self, live_bytes: usize, pressure: f64) -> Option<TriggerAdjustment> {
        if !self.config.enabled {
            return None;
        }
        let previous = self.trigger_bytes();
        let current = self.next_trigger(previous, live_bytes, pressure);
        if current == previous {
            return None;
        }

        self.current.store(current, Ordering::Relaxed);
        self.adjustments.fetch_add(1, Ordering::Relaxed);
        Some(TriggerAdjustment {
            previous,
            current,
            live_bytes,
            pressure,
            change: if current > previous {
                TriggerChange::Grow
            } else {
                TriggerChange::Shrink
            },
        })
    }

    fn next_trigger(&self, current: usize, live_bytes: usize, pressure: f64) -> usize {
        let config = &self.config;
        let limit = current as f64;
        let live = live_bytes as f64;

        let next = if pressure > config.pressure_threshold {
            limit * config.pressure_growth
        } else if live > limit * config.growth_threshold {
            limit * config.growth_factor
        } else if live < limit * config.shrink_threshold {
            limit * config.shrink_factor
        } else {
            limit
        };

        (next as usize).max(self.floor).min(self.ceiling)
    }
}
