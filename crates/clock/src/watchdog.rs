//! Liveness watchdog.
//!
//! The scheduler arms a watchdog at the start of every round. A healthy
//! scheduler re-arms it before the deadline; if the deadline passes, the
//! watchdog raises exactly one [`ResyncRequest`] for that arming.
//!
//! Expiry never touches consensus state. Implementations only hand the request
//! to a recovery path running outside the scheduler.

use parking_lot::Mutex;
use spos_core::{ResyncRequest, TimeSource};
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// Deadline-based liveness detector.
pub trait Watchdog: Send + Sync {
    /// Arm with a deadline `timeout` from now, replacing any previous arming.
    fn arm(&self, timeout: Duration, request: ResyncRequest);

    /// Cancel the pending expiry, if any.
    fn disarm(&self);
}

/// Watchdog that never fires.
///
/// Chosen explicitly when liveness monitoring is not wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledWatchdog;

impl Watchdog for DisabledWatchdog {
    fn arm(&self, _timeout: Duration, _request: ResyncRequest) {}

    fn disarm(&self) {}
}

#[derive(Debug, Clone, Copy)]
struct Arming {
    deadline: Duration,
    request: ResyncRequest,
}

#[derive(Debug, Default)]
struct ManualState {
    armed: Option<Arming>,
    armings: u64,
    fired: Vec<ResyncRequest>,
}

/// Watchdog whose expiry is checked explicitly against a time source.
///
/// Used by deterministic simulation: the harness calls [`poll`](Self::poll)
/// after moving the clock and routes fired requests itself.
pub struct ManualWatchdog {
    clock: Arc<dyn TimeSource>,
    state: Mutex<ManualState>,
}

impl ManualWatchdog {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            clock,
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Fire if the deadline has passed. Fires at most once per arming.
    pub fn poll(&self) -> Option<ResyncRequest> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let arming = state.armed?;
        if now < arming.deadline {
            return None;
        }

        state.armed = None;
        state.fired.push(arming.request);
        warn!(
            round = arming.request.round.0,
            stalled_for = ?arming.request.stalled_for,
            "Watchdog expired"
        );
        Some(arming.request)
    }

    /// Whether an arming is pending.
    pub fn is_armed(&self) -> bool {
        self.state.lock().armed.is_some()
    }

    /// Number of times the watchdog was armed.
    pub fn armings(&self) -> u64 {
        self.state.lock().armings
    }

    /// Every request fired so far.
    pub fn fired(&self) -> Vec<ResyncRequest> {
        self.state.lock().fired.clone()
    }
}

impl Watchdog for ManualWatchdog {
    fn arm(&self, timeout: Duration, request: ResyncRequest) {
        let deadline = self.clock.now().saturating_add(timeout);
        let mut state = self.state.lock();
        state.armed = Some(Arming { deadline, request });
        state.armings += 1;
        trace!(round = request.round.0, ?deadline, "Watchdog armed");
    }

    fn disarm(&self) {
        self.state.lock().armed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use spos_types::Round;
    use tracing_test::traced_test;

    fn request(round: u64) -> ResyncRequest {
        ResyncRequest {
            round: Round(round),
            stalled_for: Duration::from_secs(10),
        }
    }

    #[traced_test]
    #[test]
    fn test_fires_once_after_deadline() {
        let clock = ManualClock::new(Duration::from_secs(1_000));
        let watchdog = ManualWatchdog::new(Arc::new(clock.clone()));

        watchdog.arm(Duration::from_secs(10), request(1));
        clock.advance(Duration::from_secs(9));
        assert_eq!(watchdog.poll(), None);

        clock.advance(Duration::from_secs(2));
        assert_eq!(watchdog.poll(), Some(request(1)));
        for _ in 0..5 {
            clock.advance(Duration::from_secs(1));
            assert_eq!(watchdog.poll(), None);
        }
        assert_eq!(watchdog.fired().len(), 1);
    }

    #[traced_test]
    #[test]
    fn test_rearm_replaces_deadline() {
        let clock = ManualClock::new(Duration::ZERO);
        let watchdog = ManualWatchdog::new(Arc::new(clock.clone()));

        watchdog.arm(Duration::from_secs(10), request(1));
        clock.advance(Duration::from_secs(8));
        watchdog.arm(Duration::from_secs(10), request(2));
        clock.advance(Duration::from_secs(8));
        assert_eq!(watchdog.poll(), None);

        clock.advance(Duration::from_secs(3));
        assert_eq!(watchdog.poll(), Some(request(2)));
        assert_eq!(watchdog.armings(), 2);
    }

    #[test]
    fn test_disarm_cancels() {
        let clock = ManualClock::new(Duration::ZERO);
        let watchdog = ManualWatchdog::new(Arc::new(clock.clone()));

        watchdog.arm(Duration::from_secs(1), request(1));
        watchdog.disarm();
        clock.advance(Duration::from_secs(5));
        assert_eq!(watchdog.poll(), None);
        assert!(!watchdog.is_armed());
    }
}
