//! Per-epoch validator snapshot and leader selection.
//!
//! The eligible set, threshold and leader seed are fixed for an epoch and
//! swapped as a whole when an epoch change is applied. The scheduler loads
//! one snapshot at round start and keeps it until the round is torn down.

use arc_swap::ArcSwap;
use spos_core::ConfigError;
use spos_types::{Epoch, Hash, QuorumThreshold, Round, ValidatorId, ValidatorSet};
use std::sync::Arc;
use tracing::info;

/// Everything about an epoch that consensus reads.
#[derive(Debug, Clone)]
pub struct EpochState {
    epoch: Epoch,
    validators: ValidatorSet,
    threshold: QuorumThreshold,
    seed: Hash,
    /// Validator IDs in leader rotation order.
    leader_order: Vec<ValidatorId>,
}

impl EpochState {
    /// Build an epoch snapshot.
    ///
    /// The leader order is a shuffle of the validator set keyed by `seed`;
    /// round `r` is led by position `r mod n`.
    pub fn new(
        epoch: Epoch,
        validators: ValidatorSet,
        threshold: QuorumThreshold,
        seed: Hash,
    ) -> Result<Self, ConfigError> {
        threshold.validate(validators.total_voting_power())?;

        let leader_order = validators.shuffled_ids(&seed);
        Ok(Self {
            epoch,
            validators,
            threshold,
            seed,
            leader_order,
        })
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn threshold(&self) -> QuorumThreshold {
        self.threshold
    }

    pub fn seed(&self) -> Hash {
        self.seed
    }

    /// Leader rotation order for this epoch.
    pub fn leader_order(&self) -> &[ValidatorId] {
        &self.leader_order
    }

    /// Leader of `round`.
    pub fn leader_for(&self, round: Round) -> ValidatorId {
        let position = round.0 % self.leader_order.len() as u64;
        self.leader_order[position as usize]
    }

    /// Total weight of the eligible set.
    pub fn total_voting_power(&self) -> u64 {
        self.validators.total_voting_power()
    }

    /// Minimum weight that finalizes a header.
    pub fn required_weight(&self) -> u64 {
        self.threshold
            .required_weight(self.validators.total_voting_power())
    }

    /// Check whether `weight` satisfies the threshold.
    pub fn has_quorum(&self, weight: u64) -> bool {
        self.threshold
            .is_met(weight, self.validators.total_voting_power())
    }
}

/// Atomically swappable current epoch.
#[derive(Debug)]
pub struct EpochSnapshots {
    current: ArcSwap<EpochState>,
}

impl EpochSnapshots {
    pub fn new(initial: EpochState) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Current snapshot. Holders keep a consistent view across a later swap.
    pub fn load(&self) -> Arc<EpochState> {
        self.current.load_full()
    }

    /// Replace the current epoch. Epoch numbers must increase.
    pub fn apply(&self, next: EpochState) -> Result<(), ConfigError> {
        let current = self.current.load();
        if next.epoch <= current.epoch {
            return Err(ConfigError::Invalid(format!(
                "epoch change to {} does not follow {}",
                next.epoch, current.epoch
            )));
        }

        info!(
            from = current.epoch.0,
            to = next.epoch.0,
            validators = next.validators.len(),
            total_power = next.total_voting_power(),
            "Epoch change applied"
        );
        self.current.store(Arc::new(next));
        Ok(())
    }
}
