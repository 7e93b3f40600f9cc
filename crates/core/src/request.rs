//! Resynchronization requests.

use spos_types::Round;
use std::time::Duration;

/// Request to resynchronize with peers after the scheduler stalled.
///
/// Raised by a watchdog when its deadline passes without being re-armed or
/// disarmed. The consensus core never acts on it; it is routed to the
/// external recovery collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResyncRequest {
    /// Round that was being processed when the watchdog was armed.
    pub round: Round,

    /// How long the scheduler went without progress.
    pub stalled_for: Duration,
}

impl std::fmt::Display for ResyncRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "resync({}, stalled {:?})", self.round, self.stalled_for)
    }
}
