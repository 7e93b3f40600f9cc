//! Background clock-offset refresh.
//!
//! Offset sources can block on network round-trips, so each refresh runs on the
//! blocking pool. The [`SyncTimer`] applies the new offset atomically; the
//! scheduler never waits on a refresh.

use spos_clock::{OffsetError, OffsetSource, SyncTimer};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Offset source that reports a fixed offset.
///
/// For local networks where every node shares one host clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedOffsetSource {
    offset_nanos: i64,
}

impl FixedOffsetSource {
    pub fn new(offset_nanos: i64) -> Self {
        Self { offset_nanos }
    }
}

impl OffsetSource for FixedOffsetSource {
    fn measure_offset(&self) -> Result<i64, OffsetError> {
        Ok(self.offset_nanos)
    }
}

/// Refresh `timer` every `interval` until the task is aborted.
pub fn spawn_offset_refresh(timer: Arc<SyncTimer>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            let timer = timer.clone();
            match tokio::task::spawn_blocking(move || timer.refresh()).await {
                Ok(Ok(offset)) => debug!(offset_nanos = offset, "Clock offset refreshed"),
                // The timer already logged and kept its last offset.
                Ok(Err(_)) => {}
                Err(e) => warn!(error = %e, "Offset refresh task failed"),
            }
        }
    })
}
