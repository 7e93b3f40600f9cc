//! Collaborator traits consumed by the consensus core.
//!
//! Everything the round pipeline needs from outside (wall-clock time, block
//! construction, committing, recovery, feature activation) is reached through
//! one of these traits. Implementations must be non-blocking or bound their
//! blocking by the remaining round time.

use crate::ResyncRequest;
use spos_messages::FinalizedBlock;
use spos_types::{BlockHeader, Epoch, Round, ShardId, ValidatorId};
use std::collections::HashMap;
use std::time::Duration;

/// Source of the current time.
pub trait TimeSource: Send + Sync {
    /// Current time as a duration since the Unix epoch.
    fn now(&self) -> Duration;
}

/// Everything the block-assembly collaborator needs to build a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalRequest {
    pub shard: ShardId,
    pub epoch: Epoch,
    pub round: Round,
    pub proposer: ValidatorId,
    /// Start of the proposing round, Unix milliseconds.
    pub timestamp_ms: u64,
    /// Time left before the round's safety margin; assembly must finish within it.
    pub time_budget: Duration,
}

/// Builds and validates block headers.
///
/// Body construction and execution live behind this trait; consensus only
/// handles the header.
pub trait BlockAssembler: Send + Sync {
    /// Build a candidate header for the given round, or `None` if no header
    /// can be produced yet.
    fn assemble(&self, request: &ProposalRequest) -> Option<BlockHeader>;

    /// Check a received header for structural validity against local chain state.
    fn validate(&self, header: &BlockHeader) -> bool;
}

/// Receives finalized headers.
pub trait BlockCommitter: Send + Sync {
    /// Commit a finalized header. Called once per finalized round.
    fn commit(&self, block: &FinalizedBlock);
}

/// Receives resynchronization requests.
pub trait ResyncTrigger: Send + Sync {
    /// Start recovery after the scheduler stalled.
    fn request_resync(&self, request: ResyncRequest);
}

/// Protocol behaviours that switch on at a fixed round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsensusFlag {
    /// The leader attaches its own partial signature to its block proposal.
    LeaderSignsProposal,
}

/// Read-only oracle answering whether a flag is active at a round.
pub trait RoundGate: Send + Sync {
    /// Round from which the flag is active, if it is scheduled at all.
    fn activation_round(&self, flag: ConsensusFlag) -> Option<Round>;

    /// Check whether the flag is active at `round`.
    fn is_enabled(&self, flag: ConsensusFlag, round: Round) -> bool {
        self.activation_round(flag)
            .is_some_and(|activation| round >= activation)
    }
}

/// Static activation table.
#[derive(Debug, Clone, Default)]
pub struct ActivationRounds {
    rounds: HashMap<ConsensusFlag, Round>,
}

impl ActivationRounds {
    /// No flag is ever enabled.
    pub fn none() -> Self {
        Self::default()
    }

    /// Schedule `flag` to activate at `round`.
    pub fn with(mut self, flag: ConsensusFlag, round: Round) -> Self {
        self.rounds.insert(flag, round);
        self
    }
}

impl RoundGate for ActivationRounds {
    fn activation_round(&self, flag: ConsensusFlag) -> Option<Round> {
        self.rounds.get(&flag).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_rounds() {
        let gate = ActivationRounds::none().with(ConsensusFlag::LeaderSignsProposal, Round(10));

        assert!(!gate.is_enabled(ConsensusFlag::LeaderSignsProposal, Round(9)));
        assert!(gate.is_enabled(ConsensusFlag::LeaderSignsProposal, Round(10)));
        assert!(gate.is_enabled(ConsensusFlag::LeaderSignsProposal, Round(11)));
    }

    #[test]
    fn test_unscheduled_flag_is_disabled() {
        let gate = ActivationRounds::none();
        assert!(!gate.is_enabled(ConsensusFlag::LeaderSignsProposal, Round(u64::MAX)));
    }
}
