//! Round-gated protocol behaviour.

use spos_core::{ConsensusFlag, RoundGate};
use spos_types::Round;

/// Whether a gated behaviour applies to the current round.
///
/// Recomputed from the [`RoundGate`] oracle at every round start; consensus
/// code reads the value, never the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundGatedFlag {
    flag: ConsensusFlag,
    activation_round: Option<Round>,
    currently_enabled: bool,
}

impl RoundGatedFlag {
    /// A flag that is off until first refreshed.
    pub fn new(flag: ConsensusFlag) -> Self {
        Self {
            flag,
            activation_round: None,
            currently_enabled: false,
        }
    }

    /// Recompute for `round`. Returns true if the value changed.
    pub fn refresh(&mut self, gate: &dyn RoundGate, round: Round) -> bool {
        self.activation_round = gate.activation_round(self.flag);
        let enabled = gate.is_enabled(self.flag, round);
        let changed = enabled != self.currently_enabled;
        self.currently_enabled = enabled;
        changed
    }

    pub fn flag(&self) -> ConsensusFlag {
        self.flag
    }

    pub fn activation_round(&self) -> Option<Round> {
        self.activation_round
    }

    pub fn is_enabled(&self) -> bool {
        self.currently_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spos_core::ActivationRounds;

    #[test]
    fn test_flag_follows_activation_round() {
        let gate = ActivationRounds::none().with(ConsensusFlag::LeaderSignsProposal, Round(5));
        let mut flag = RoundGatedFlag::new(ConsensusFlag::LeaderSignsProposal);

        assert!(!flag.refresh(&gate, Round(4)));
        assert!(!flag.is_enabled());
        assert_eq!(flag.activation_round(), Some(Round(5)));

        assert!(flag.refresh(&gate, Round(5)));
        assert!(flag.is_enabled());
        assert!(!flag.refresh(&gate, Round(6)));
    }
}
