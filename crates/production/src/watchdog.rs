//! Tokio-based liveness watchdog.
//!
//! Each arming spawns a sleeping task. On expiry the task only sends the
//! [`ResyncRequest`] to the runner's channel; the runner decides what to do
//! with it on its own task.

use parking_lot::Mutex;
use spos_clock::Watchdog;
use spos_core::ResyncRequest;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Watchdog whose expiry is delivered over an mpsc channel.
pub struct TokioWatchdog {
    runtime: Handle,
    tx: mpsc::UnboundedSender<ResyncRequest>,
    /// Bumped on every arm/disarm; a timer only fires if its generation is current.
    generation: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TokioWatchdog {
    /// Create a watchdog bound to the current tokio runtime.
    ///
    /// Must be called from within a runtime.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ResyncRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let watchdog = Self {
            runtime: Handle::current(),
            tx,
            generation: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        };
        (watchdog, rx)
    }

    fn cancel(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        generation
    }
}

impl Watchdog for TokioWatchdog {
    fn arm(&self, timeout: Duration, request: ResyncRequest) {
        let armed_generation = self.cancel();
        let generation = self.generation.clone();
        let tx = self.tx.clone();

        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if generation.load(Ordering::SeqCst) != armed_generation {
                return;
            }
            warn!(round = request.round.0, ?timeout, "Watchdog expired");
            if tx.send(request).is_err() {
                debug!("Resync receiver dropped");
            }
        });

        *self.task.lock() = Some(handle);
        trace!(round = request.round.0, ?timeout, "Watchdog armed");
    }

    fn disarm(&self) {
        self.cancel();
        trace!("Watchdog disarmed");
    }
}

impl Drop for TokioWatchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}
