//! Status reporting seam.
//!
//! Consensus publishes its progress as fire-and-forget key/value updates.
//! A sink that fails or drops updates never affects consensus.

use spos_types::{Epoch, Hash, Round, SubroundId, ValidatorId};

/// Stable status keys.
pub mod keys {
    /// Current round index.
    pub const CURRENT_ROUND: &str = "spos_current_round";
    /// Index of the current subround in the pipeline.
    pub const CURRENT_SUBROUND: &str = "spos_current_subround";
    /// Name of the current subround.
    pub const CURRENT_SUBROUND_NAME: &str = "spos_current_subround_name";
    /// Current epoch.
    pub const CURRENT_EPOCH: &str = "spos_current_epoch";
    /// 1 if this node leads the current round.
    pub const IS_LEADER: &str = "spos_is_leader";
    /// Outcome of the last completed round.
    pub const CONSENSUS_STATE: &str = "spos_consensus_state";
    /// Last finalized round.
    pub const LAST_FINALIZED_ROUND: &str = "spos_last_finalized_round";
    /// Rounds finalized since start.
    pub const ROUNDS_FINALIZED: &str = "spos_rounds_finalized";
    /// Rounds abandoned since start.
    pub const ROUNDS_ABANDONED: &str = "spos_rounds_abandoned";
    /// Subrounds that missed their deadline.
    pub const SUBROUND_FAILURES: &str = "spos_subround_failures";
    /// Rounds this node proposed in.
    pub const ROUNDS_LED: &str = "spos_rounds_led";
    /// Inbound messages rejected at the boundary.
    pub const MESSAGES_DROPPED: &str = "spos_messages_dropped";
    /// Resynchronization requests raised by the watchdog.
    pub const RESYNC_REQUESTS: &str = "spos_resync_requests";
}

/// Outcome of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusOutcome {
    /// Round is still being processed.
    InProgress,
    /// A header was finalized.
    Finalized,
    /// The round elapsed without finalizing.
    Abandoned,
}

impl ConsensusOutcome {
    /// Stable name for status values.
    pub fn name(self) -> &'static str {
        match self {
            ConsensusOutcome::InProgress => "in_progress",
            ConsensusOutcome::Finalized => "finalized",
            ConsensusOutcome::Abandoned => "abandoned",
        }
    }
}

/// A transition observed by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    RoundStarted {
        round: Round,
        epoch: Epoch,
        leader: ValidatorId,
        is_leader: bool,
    },
    SubroundEntered {
        round: Round,
        subround: SubroundId,
    },
    SubroundFailed {
        round: Round,
        subround: SubroundId,
    },
    RoundFinalized {
        round: Round,
        header_hash: Hash,
        signers: usize,
        voting_power: u64,
    },
    RoundAbandoned {
        round: Round,
        reason: &'static str,
    },
    MessageDropped {
        round: Round,
        reason: &'static str,
    },
    ResyncRequested {
        round: Round,
    },
}

/// Receives key/value status updates.
///
/// Implementations must not block: they are called from the scheduler tick.
pub trait StatusSink: Send + Sync {
    /// Set an integer value.
    fn set_u64(&self, key: &'static str, value: u64);

    /// Set a string value.
    fn set_str(&self, key: &'static str, value: &str);

    /// Increment a counter by one.
    fn increment(&self, key: &'static str);
}

/// Status sink that discards everything.
///
/// Chosen explicitly at construction when no reporting is wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStatusSink;

impl StatusSink for NoopStatusSink {
    fn set_u64(&self, _key: &'static str, _value: u64) {}

    fn set_str(&self, _key: &'static str, _value: &str) {}

    fn increment(&self, _key: &'static str) {}
}
