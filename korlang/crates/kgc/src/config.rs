//! Configuration Module - GC Tuning Parameters
//!
//! Manages the sizing and scheduling knobs of the collector. The defaults
//! suit a small embedded runtime; tests usually shrink both generations.

use crate::heap::AdaptiveConfig;
use crate::util::constants::{MAX_CAPACITY, MB};

/// Main configuration for the Korlang Garbage Collector
///
/// # Examples
///
/// ```rust
/// use kgc::GcConfig;
///
/// let config = GcConfig {
///     young_capacity: 256 * 1024,
///     promotion_threshold: 3,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Young generation capacity in bytes
    ///
    /// Rounded up to the system page size when the heap is mapped.
    /// Default: 4MB
    pub young_capacity: usize,

    /// Old generation capacity in bytes
    ///
    /// Default: 32MB
    pub old_capacity: usize,

    /// Promotion threshold
    ///
    /// A young survivor is promoted once its age exceeds this value. With
    /// the default of 1, an object moves on its second survived minor cycle.
    ///
    /// Default: 1
    pub promotion_threshold: u16,

    /// Young occupancy ratio (0.0 - 1.0] at which allocation runs a minor
    /// collection before carving the next object
    ///
    /// Only honoured while a root provider is installed.
    /// Default: 0.8
    pub minor_watermark: f64,

    /// Old occupancy ratio (0.0 - 1.0] that schedules a major collection
    /// after an allocation-triggered minor
    ///
    /// Default: 0.75
    pub major_watermark: f64,

    /// Slide live old objects together during major collections
    ///
    /// Default: true
    pub compact_old: bool,

    /// Check every header against the space map at cycle start
    ///
    /// Default: true
    pub verify_heap: bool,

    /// Objects marked per incremental step when no budget is given
    ///
    /// Default: 256
    pub incremental_budget: usize,

    /// Adaptive tuning of the minor trigger
    ///
    /// Starts at `minor_watermark` and moves after every minor cycle.
    pub adaptive: AdaptiveConfig,

    /// Enable verbose GC logging
    ///
    /// Forces console output of GC events.
    /// Default: false
    pub verbose: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            young_capacity: 4 * MB,
            old_capacity: 32 * MB,
            promotion_threshold: 1,
            minor_watermark: 0.8,
            major_watermark: 0.75,
            compact_old: true,
            verify_heap: true,
            incremental_budget: 256,
            adaptive: AdaptiveConfig::default(),
            verbose: false,
        }
    }
}

impl GcConfig {
    /// Validate configuration
    ///
    /// ```rust
    /// use kgc::GcConfig;
    ///
    /// let config = GcConfig {
    ///     young_capacity: 0,
    ///     ..Default::default()
    /// };
    ///
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.young_capacity == 0 {
            return Err(ConfigError::InvalidCapacity(
                "young_capacity must be > 0".to_string(),
            ));
        }

        if self.old_capacity == 0 {
            return Err(ConfigError::InvalidCapacity(
                "old_capacity must be > 0".to_string(),
            ));
        }

        if self.young_capacity > MAX_CAPACITY || self.old_capacity > MAX_CAPACITY {
            return Err(ConfigError::InvalidCapacity(format!(
                "generation capacity must be <= {} bytes",
                MAX_CAPACITY
            )));
        }

        if !(self.minor_watermark > 0.0 && self.minor_watermark <= 1.0) {
            return Err(ConfigError::InvalidWatermark(
                "minor_watermark must be in (0.0, 1.0]".to_string(),
            ));
        }

        if !(self.major_watermark > 0.0 && self.major_watermark <= 1.0) {
            return Err(ConfigError::InvalidWatermark(
                "major_watermark must be in (0.0, 1.0]".to_string(),
            ));
        }

        if self.incremental_budget == 0 {
            return Err(ConfigError::InvalidBudget(
                "incremental_budget must be > 0".to_string(),
            ));
        }

        self.adaptive.validate()
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - KGC_YOUNG_CAPACITY
    /// - KGC_OLD_CAPACITY
    /// - KGC_PROMOTION_THRESHOLD
    /// - KGC_MINOR_WATERMARK
    /// - KGC_VERIFY_HEAP
    /// - KGC_ADAPTIVE
    /// - KGC_VERBOSE
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(size) = env_parse::<usize>("KGC_YOUNG_CAPACITY") {
            config.young_capacity = size;
        }

        if let Some(size) = env_parse::<usize>("KGC_OLD_CAPACITY") {
            config.old_capacity = size;
        }

        if let Some(threshold) = env_parse::<u16>("KGC_PROMOTION_THRESHOLD") {
            config.promotion_threshold = threshold;
        }

        if let Some(ratio) = env_parse::<f64>("KGC_MINOR_WATERMARK") {
            config.minor_watermark = ratio;
        }

        if let Ok(val) = std::env::var("KGC_VERIFY_HEAP") {
            config.verify_heap = env_flag(&val);
        }

        if let Ok(val) = std::env::var("KGC_ADAPTIVE") {
            config.adaptive.enabled = env_flag(&val);
        }

        if let Ok(val) = std::env::var("KGC_VERBOSE") {
            config.verbose = env_flag(&val);
        }

        config
    }

    /// Young occupancy in bytes at which allocation schedules a minor cycle
    pub fn minor_trigger_bytes(&self, young_capacity: usize) -> usize {
        (young_capacity as f64 * self.minor_watermark) as usize
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|val| val.trim().parse().ok())
}

fn env_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid capacity: {0}")]
    InvalidCapacity(String),

    #[error("Invalid watermark: {0}")]
    InvalidWatermark(String),

    #[error("Invalid incremental budget: {0}")]
    InvalidBudget(String),

    #[error("Invalid adaptive trigger: {0}")]
    InvalidAdaptive(String),
}

impl From<ConfigError> for crate::error::KgcError {
    fn from(err: ConfigError) -> Self {
        crate::error::KgcError::Configuration(err.to_string())
    }
}
