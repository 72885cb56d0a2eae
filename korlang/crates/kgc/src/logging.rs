//! GC Logging and Tracing
//!
//! Structured events for collector activity. Each collector owns a
//! [`GcLogger`] built from the process-wide default configuration, which
//! embedders change with [`configure_logger`] before creating collectors.
//!
//! Log Levels:
//! - ERROR: allocation failures, heap corruption
//! - WARN: failed promotions
//! - INFO: GC cycles, heap statistics
//! - DEBUG: phases, finalizer queue traffic
//! - TRACE: promotion and sweep details

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Log level for GC operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// GC event types
#[derive(Debug, Clone, PartialEq)]
pub enum GcEvent {
    /// GC cycle started
    CycleStart {
        kind: String,
        reason: String,
        cycle: u64,
    },

    /// GC phase completed
    PhaseEnd {
        phase: String,
        duration_ms: f64,
        cycle: u64,
    },

    /// GC cycle completed
    CycleEnd {
        cycle: u64,
        duration_ms: f64,
        reclaimed_bytes: usize,
    },

    /// Survivors moved to the old generation
    Promotion {
        cycle: u64,
        promoted_objects: usize,
        promoted_bytes: usize,
        failed: usize,
    },

    /// Sweep results
    Sweep {
        cycle: u64,
        reclaimed_objects: usize,
        reclaimed_bytes: usize,
    },

    /// Objects diverted to the finalizer queue
    FinalizerQueued { cycle: u64, count: usize },

    /// Old generation compaction results
    Compaction {
        cycle: u64,
        relocated_objects: usize,
        bytes_moved: usize,
    },

    /// Heap statistics
    HeapStats {
        young_used: usize,
        old_used: usize,
        total_bytes: usize,
        utilization: f64,
    },

    /// Minor trigger retuned after a cycle
    TriggerAdjusted {
        cycle: u64,
        change: String,
        previous_bytes: usize,
        trigger_bytes: usize,
        live_bytes: usize,
    },

    /// Allocation failure
    AllocationFailure { size: usize, largest_free: usize },

    /// Header verification failed
    HeapCorruption { address: usize, reason: String },
}

/// GC Logger configuration
#[derive(Debug, Clone)]
pub struct GcLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Enable console output
    pub console: bool,

    /// Enable JSON format
    pub json: bool,

    /// Enable timestamps
    pub timestamps: bool,

    /// Events kept in the in-memory buffer; the oldest are dropped first
    pub buffer_capacity: usize,
}

impl Default for GcLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: false,
            json: false,
            timestamps: true,
            buffer_capacity: 1024,
        }
    }
}

/// GC Logger - event buffer plus optional console output
pub struct GcLogger {
    config: GcLoggerConfig,
    events: Mutex<VecDeque<(Instant, GcEvent)>>,
    enabled: AtomicBool,
}

impl GcLogger {
    /// Create new GC logger
    pub fn new(config: GcLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(VecDeque::new()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Logger built from the process-wide defaults
    pub fn from_global(verbose: bool) -> Self {
        let mut config = GLOBAL_LOGGER_CONFIG.read().clone();
        if verbose {
            config.console = true;
            config.level = config.level.max(LogLevel::Debug);
        }
        Self::new(config)
    }

    /// Enable logging
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Disable logging
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Check if logging is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &GcLoggerConfig {
        &self.config
    }

    /// Log a GC event
    pub fn log(&self, event: GcEvent) {
        if !self.is_enabled() {
            return;
        }

        if Self::event_level(&event) > self.config.level {
            return;
        }

        if self.config.console {
            self.output_console(&event);
        }

        let mut events = self.events.lock();
        if self.config.buffer_capacity == 0 {
            return;
        }
        while events.len() >= self.config.buffer_capacity {
            events.pop_front();
        }
        events.push_back((Instant::now(), event));
    }

    /// Get log level for event
    fn event_level(event: &GcEvent) -> LogLevel {
        match event {
            GcEvent::AllocationFailure { .. } | GcEvent::HeapCorruption { .. } => LogLevel::Error,
            GcEvent::Promotion { failed, .. } if *failed > 0 => LogLevel::Warn,
            GcEvent::CycleStart { .. } | GcEvent::CycleEnd { .. } | GcEvent::HeapStats { .. } => {
                LogLevel::Info
            },
            GcEvent::TriggerAdjusted { .. } => LogLevel::Info,
            GcEvent::PhaseEnd { .. } | GcEvent::FinalizerQueued { .. } => LogLevel::Debug,
            GcEvent::Promotion { .. } | GcEvent::Sweep { .. } | GcEvent::Compaction { .. } => {
                LogLevel::Trace
            },
        }
    }

    /// Output to console
    fn output_console(&self, event: &GcEvent) {
        let prefix = if self.config.timestamps {
            format!("[{}] ", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
        } else {
            String::new()
        };

        let line = if self.config.json {
            Self::format_json(event)
        } else {
            Self::format_human(event)
        };

        if Self::event_level(event) == LogLevel::Error {
            eprintln!("{}{}", prefix, line);
        } else {
            println!("{}{}", prefix, line);
        }
    }

    /// Human-readable rendering
    pub fn format_human(event: &GcEvent) -> String {
        match event {
            GcEvent::CycleStart {
                kind,
                reason,
                cycle,
            } => format!("[GC] Cycle {} started ({}, reason: {})", cycle, kind, reason),
            GcEvent::PhaseEnd {
                phase,
                duration_ms,
                cycle,
            } => format!(
                "[GC] Cycle {}: {} phase completed ({:.2}ms)",
                cycle, phase, duration_ms
            ),
            GcEvent::CycleEnd {
                cycle,
                duration_ms,
                reclaimed_bytes,
            } => format!(
                "[GC] Cycle {} completed ({:.2}ms, reclaimed {} bytes)",
                cycle, duration_ms, reclaimed_bytes
            ),
            GcEvent::Promotion {
                cycle,
                promoted_objects,
                promoted_bytes,
                failed,
            } => format!(
                "[GC] Cycle {}: promoted {} objects ({} bytes), {} left young",
                cycle, promoted_objects, promoted_bytes, failed
            ),
            GcEvent::Sweep {
                cycle,
                reclaimed_objects,
                reclaimed_bytes,
            } => format!(
                "[GC] Cycle {}: swept {} objects ({} bytes)",
                cycle, reclaimed_objects, reclaimed_bytes
            ),
            GcEvent::FinalizerQueued { cycle, count } => {
                format!("[GC] Cycle {}: {} objects queued for finalization", cycle, count)
            },
            GcEvent::Compaction {
                cycle,
                relocated_objects,
                bytes_moved,
            } => format!(
                "[GC] Cycle {}: compacted {} objects ({} bytes moved)",
                cycle, relocated_objects, bytes_moved
            ),
            GcEvent::HeapStats {
                young_used,
                old_used,
                total_bytes,
                utilization,
            } => format!(
                "[GC] Heap: young {} + old {} of {} bytes ({:.1}% utilized)",
                young_used,
                old_used,
                total_bytes,
                utilization * 100.0
            ),
            GcEvent::TriggerAdjusted {
                cycle,
                change,
                previous_bytes,
                trigger_bytes,
                live_bytes,
            } => format!(
                "[GC] Cycle {}: minor trigger {} {} -> {} bytes ({} live)",
                cycle, change, previous_bytes, trigger_bytes, live_bytes
            ),
            GcEvent::AllocationFailure { size, largest_free } => format!(
                "[GC] Allocation failure: {} bytes (largest free block: {})",
                size, largest_free
            ),
            GcEvent::HeapCorruption { address, reason } => {
                format!("[GC] Heap corruption at {:#x}: {}", address, reason)
            },
        }
    }

    /// JSON rendering
    pub fn format_json(event: &GcEvent) -> String {
        let json = match event {
            GcEvent::CycleStart {
                kind,
                reason,
                cycle,
            } => serde_json::json!({
                "type": "cycle_start",
                "cycle": cycle,
                "kind": kind,
                "reason": reason
            }),
            GcEvent::PhaseEnd {
                phase,
                duration_ms,
                cycle,
            } => serde_json::json!({
                "type": "phase_end",
                "cycle": cycle,
                "phase": phase,
                "duration_ms": duration_ms
            }),
            GcEvent::CycleEnd {
                cycle,
                duration_ms,
                reclaimed_bytes,
            } => serde_json::json!({
                "type": "cycle_end",
                "cycle": cycle,
                "duration_ms": duration_ms,
                "reclaimed_bytes": reclaimed_bytes
            }),
            GcEvent::Promotion {
                cycle,
                promoted_objects,
                promoted_bytes,
                failed,
            } => serde_json::json!({
                "type": "promotion",
                "cycle": cycle,
                "promoted_objects": promoted_objects,
                "promoted_bytes": promoted_bytes,
                "failed": failed
            }),
            GcEvent::Sweep {
                cycle,
                reclaimed_objects,
                reclaimed_bytes,
            } => serde_json::json!({
                "type": "sweep",
                "cycle": cycle,
                "reclaimed_objects": reclaimed_objects,
                "reclaimed_bytes": reclaimed_bytes
            }),
            GcEvent::FinalizerQueued { cycle, count } => serde_json::json!({
                "type": "finalizer_queued",
                "cycle": cycle,
                "count": count
            }),
            GcEvent::Compaction {
                cycle,
                relocated_objects,
                bytes_moved,
            } => serde_json::json!({
                "type": "compaction",
                "cycle": cycle,
                "relocated_objects": relocated_objects,
                "bytes_moved": bytes_moved
            }),
            GcEvent::HeapStats {
                young_used,
                old_used,
                total_bytes,
                utilization,
            } => serde_json::json!({
                "type": "heap_stats",
                "young_used": young_used,
                "old_used": old_used,
                "total_bytes": total_bytes,
                "utilization": utilization
            }),
            GcEvent::TriggerAdjusted {
                cycle,
                change,
                previous_bytes,
                trigger_bytes,
                live_bytes,
            } => serde_json::json!({
                "type": "trigger_adjusted",
                "cycle": cycle,
                "change": change,
                "previous_bytes": previous_bytes,
                "trigger_bytes": trigger_bytes,
                "live_bytes": live_bytes
            }),
            GcEvent::AllocationFailure { size, largest_free } => serde_json::json!({
                "type": "allocation_failure",
                "size": size,
                "largest_free": largest_free
            }),
            GcEvent::HeapCorruption { address, reason } => serde_json::json!({
                "type": "heap_corruption",
                "address": address,
                "reason": reason
            }),
        };

        json.to_string()
    }

    /// Get all buffered events
    pub fn get_events(&self) -> Vec<(Instant, GcEvent)> {
        self.events.lock().iter().cloned().collect()
    }

    /// Clear all events
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Get event count
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for GcLogger {
    fn default() -> Self {
        Self::new(GcLoggerConfig::default())
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_LOGGER_CONFIG: RwLock<GcLoggerConfig> = RwLock::new(GcLoggerConfig::default());
}

/// Configure the logger used by collectors created from now on
pub fn configure_logger(config: GcLoggerConfig) {
    *GLOBAL_LOGGER_CONFIG.write() = config;
}

/// Current process-wide logger configuration
pub fn logger_config() -> GcLoggerConfig {
    GLOBAL_LOGGER_CONFIG.read().clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle_start() -> GcEvent {
        GcEvent::CycleStart {
            kind: "minor".to_string(),
            reason: "allocation".to_string(),
            cycle: 1,
        }
    }

    #[test]
    fn test_gc_logger_basic() {
        let logger = GcLogger::default();
        logger.log(cycle_start());
        assert_eq!(logger.event_count(), 1);
    }

    #[test]
    fn test_gc_logger_disable() {
        let logger = GcLogger::default();
        logger.disable();
        logger.log(cycle_start());
        assert_eq!(logger.event_count(), 0);

        logger.enable();
        logger.log(cycle_start());
        assert_eq!(logger.event_count(), 1);
    }

    #[test]
    fn test_level_filter() {
        let logger = GcLogger::default();
        logger.log(GcEvent::Sweep {
            cycle: 1,
            reclaimed_objects: 3,
            reclaimed_bytes: 96,
        });
        assert_eq!(logger.event_count(), 0);

        logger.log(GcEvent::Promotion {
            cycle: 1,
            promoted_objects: 0,
            promoted_bytes: 0,
            failed: 2,
        });
        assert_eq!(logger.event_count(), 1);
    }

    #[test]
    fn test_trigger_adjusted_rendering() {
        let event = GcEvent::TriggerAdjusted {
            cycle: 7,
            change: "grow".to_string(),
            previous_bytes: 1000,
            trigger_bytes: 1500,
            live_bytes: 800,
        };
        let json: serde_json::Value =
            serde_json::from_str(&GcLogger::format_json(&event)).unwrap();
        assert_eq!(json["type"], "trigger_adjusted");
        assert_eq!(json["trigger_bytes"], 1500);
        assert!(GcLogger::format_human(&event).contains("grow 1000 -> 1500"));
    }

    #[test]
    fn test_buffer_drops_oldest() {
        let logger = GcLogger::new(GcLoggerConfig {
            buffer_capacity: 2,
            ..Default::default()
        });
        for cycle in 1..=3 {
            logger.log(GcEvent::CycleEnd {
                cycle,
                duration_ms: 0.0,
                reclaimed_bytes: 0,
            });
        }

        let events = logger.get_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].1, GcEvent::CycleEnd { cycle: 2, .. }));
    }

    #[test]
    fn test_json_rendering() {
        let line = GcLogger::format_json(&GcEvent::FinalizerQueued { cycle: 4, count: 2 });
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "finalizer_queued");
        assert_eq!(value["count"], 2);
    }

    #[test]
    fn test_human_rendering() {
        let line = GcLogger::format_human(&GcEvent::HeapCorruption {
            address: 0x40,
            reason: "bad gen".to_string(),
        });
        assert_eq!(line, "[GC] Heap corruption at 0x40: bad gen");
    }

    #[test]
    fn test_verbose_forces_console() {
        let logger = GcLogger::from_global(true);
        assert!(logger.config().console);
        assert!(logger.config().level >= LogLevel::Debug);
    }
}
