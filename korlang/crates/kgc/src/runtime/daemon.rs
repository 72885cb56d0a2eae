//! Finalizer Daemon - background thread draining the finalizer queue
//!
//! The thread sleeps until the collector signals newly queued objects or the
//! tick elapses, then runs every pending finalizer through
//! [`GarbageCollector::run_finalizers`]. Finalizers never run under the
//! world lock, so a finalizer may allocate or store references.

use crate::error::{KgcError, Result};
use crate::gc::GarbageCollector;
use crate::object::ObjectRef;
use crossbeam::channel::{self, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Handle to a running finalizer thread
pub struct FinalizerDaemon {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    finalized: Arc<AtomicU64>,
}

impl FinalizerDaemon {
    /// Start draining `gc`'s finalizer queue with `finalize`
    pub fn spawn<F>(gc: Arc<GarbageCollector>, tick: Duration, mut finalize: F) -> Result<Self>
    where
        F: FnMut(ObjectRef) + Send + 'static,
    {
        let wake = gc.subscribe_finalizer_wakeups();
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let finalized = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&finalized);

        let handle = thread::Builder::new()
            .name("kgc-finalizer".to_string())
            .spawn(move || run(&gc, &wake, &stop_rx, tick, &mut finalize, &counter))
            .map_err(|e| {
                KgcError::InvalidState {
                    expected: "finalizer thread started".to_string(),
                    actual: e.to_string(),
                }
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
            finalized,
        })
    }

    /// Objects finalized by this daemon so far
    pub fn finalized(&self) -> u64 {
        self.finalized.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Drain what is pending, stop the thread and wait for it
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("finalizer daemon: thread panicked");
            }
        }
    }
}

impl Drop for FinalizerDaemon {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    gc: &GarbageCollector,
    wake: &Receiver<()>,
    stop: &Receiver<()>,
    tick: Duration,
    finalize: &mut dyn FnMut(ObjectRef),
    finalized: &AtomicU64,
) {
    log::debug!("finalizer daemon: started (tick {:?})", tick);
    loop {
        let stopping = crossbeam::select! {
            recv(stop) -> _ => true,
            recv(wake) -> msg => msg.is_err(),
            default(tick) => false,
        };

        match gc.run_finalizers(|obj| finalize(obj)) {
            Ok(count) => {
                finalized.fetch_add(count as u64, Ordering::Relaxed);
            },
            Err(e) => log::error!("finalizer daemon: {}", e),
        }

        if stopping {
            break;
        }
    }
    log::debug!("finalizer daemon: stopped");
}
