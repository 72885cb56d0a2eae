//! Runtime Module - finalization support for the embedding runtime
//!
//! - [`FinalizerQueue`]: per-object finalization state machine
//! - [`FinalizerDaemon`]: optional background thread draining the queue

pub mod daemon;
pub mod finalizer;

pub use daemon::FinalizerDaemon;
pub use finalizer::{FinalizerQueue, FinalizerState};
