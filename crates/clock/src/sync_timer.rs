//! Local clock corrected against an external reference.

use spos_core::TimeSource;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by an offset source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OffsetError {
    #[error("reference clock unreachable: {0}")]
    Unreachable(String),

    #[error("invalid reference response: {0}")]
    InvalidResponse(String),
}

/// Measures the offset between the local clock and a reference clock.
///
/// The round-trip measurement itself (NTP or otherwise) lives behind this
/// trait.
pub trait OffsetSource: Send + Sync {
    /// Reference time minus local time, in nanoseconds.
    fn measure_offset(&self) -> Result<i64, OffsetError>;
}

/// Current time adjusted by the last measured offset.
///
/// The offset is a single atomic word, so readers never see a partially
/// applied update. Returned times never go backwards, even when a new offset
/// is smaller than the previous one.
pub struct SyncTimer {
    local: Arc<dyn TimeSource>,
    source: Arc<dyn OffsetSource>,
    offset_nanos: AtomicI64,
    last_returned_nanos: AtomicU64,
    successful_refreshes: AtomicU64,
    failed_refreshes: AtomicU64,
}

impl SyncTimer {
    /// Create a timer with zero offset. Call [`refresh`](Self::refresh) to measure.
    pub fn new(local: Arc<dyn TimeSource>, source: Arc<dyn OffsetSource>) -> Self {
        Self {
            local,
            source,
            offset_nanos: AtomicI64::new(0),
            last_returned_nanos: AtomicU64::new(0),
            successful_refreshes: AtomicU64::new(0),
            failed_refreshes: AtomicU64::new(0),
        }
    }

    /// Measure the offset again.
    ///
    /// On failure the previous offset stays in effect.
    pub fn refresh(&self) -> Result<i64, OffsetError> {
        match self.source.measure_offset() {
            Ok(offset) => {
                let previous = self.offset_nanos.swap(offset, Ordering::AcqRel);
                self.successful_refreshes.fetch_add(1, Ordering::Relaxed);
                debug!(
                    offset_ms = offset / 1_000_000,
                    previous_ms = previous / 1_000_000,
                    "Clock offset updated"
                );
                Ok(offset)
            }
            Err(e) => {
                self.failed_refreshes.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %e,
                    offset_ms = self.offset() / 1_000_000,
                    "Clock offset refresh failed, keeping last offset"
                );
                Err(e)
            }
        }
    }

    /// Offset currently applied, in nanoseconds.
    pub fn offset(&self) -> i64 {
        self.offset_nanos.load(Ordering::Acquire)
    }

    /// Number of successful and failed refreshes so far.
    pub fn refresh_counts(&self) -> (u64, u64) {
        (
            self.successful_refreshes.load(Ordering::Relaxed),
            self.failed_refreshes.load(Ordering::Relaxed),
        )
    }

    /// Local time plus offset, never earlier than any previously returned time.
    pub fn current_time(&self) -> Duration {
        let local = self.local.now().as_nanos() as i128;
        let adjusted = (local + self.offset() as i128).clamp(0, u64::MAX as i128) as u64;
        let previous = self
            .last_returned_nanos
            .fetch_max(adjusted, Ordering::AcqRel);
        Duration::from_nanos(previous.max(adjusted))
    }
}

impl TimeSource for SyncTimer {
    fn now(&self) -> Duration {
        self.current_time()
    }
}
