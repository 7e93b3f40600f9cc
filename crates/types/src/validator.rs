//! Eligible validator set and quorum threshold.

use crate::{Hash, PublicKey, ValidatorId, VotePower};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A validator eligible to sign during an epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorInfo {
    /// Validator identity.
    pub validator_id: ValidatorId,
    /// BLS public key.
    pub public_key: PublicKey,
    /// Signing weight.
    pub voting_power: u64,
}

/// Ordered set of eligible validators for one epoch.
///
/// The order is significant: it defines the bit positions of
/// [`SignerBitfield`](crate::SignerBitfield)s and the input of leader
/// selection.
#[derive(Debug, Clone)]
pub struct ValidatorSet {
    validators: Vec<ValidatorInfo>,
    index: HashMap<ValidatorId, usize>,
    total_voting_power: u64,
}

impl ValidatorSet {
    /// Build a validator set, rejecting empty, duplicate or weightless entries.
    pub fn new(validators: Vec<ValidatorInfo>) -> Result<Self, ValidatorSetError> {
        if validators.is_empty() {
            return Err(ValidatorSetError::Empty);
        }

        let mut index = HashMap::with_capacity(validators.len());
        let mut total_voting_power: u64 = 0;
        for (i, v) in validators.iter().enumerate() {
            if v.voting_power == 0 {
                return Err(ValidatorSetError::ZeroVotingPower(v.validator_id));
            }
            if index.insert(v.validator_id, i).is_some() {
                return Err(ValidatorSetError::Duplicate(v.validator_id));
            }
            total_voting_power = total_voting_power
                .checked_add(v.voting_power)
                .ok_or(ValidatorSetError::VotingPowerOverflow)?;
        }

        Ok(Self {
            validators,
            index,
            total_voting_power,
        })
    }

    /// Number of validators.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Always false; construction rejects empty sets.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Sum of all voting power.
    pub fn total_voting_power(&self) -> u64 {
        self.total_voting_power
    }

    /// Iterate validators in set order.
    pub fn iter(&self) -> impl Iterator<Item = &ValidatorInfo> {
        self.validators.iter()
    }

    /// Look up a validator by ID.
    pub fn get(&self, validator_id: ValidatorId) -> Option<&ValidatorInfo> {
        self.index.get(&validator_id).map(|&i| &self.validators[i])
    }

    /// Validator at a given set index.
    pub fn at(&self, index: usize) -> Option<&ValidatorInfo> {
        self.validators.get(index)
    }

    /// Set index of a validator.
    pub fn index_of(&self, validator_id: ValidatorId) -> Option<usize> {
        self.index.get(&validator_id).copied()
    }

    /// Check membership.
    pub fn contains(&self, validator_id: ValidatorId) -> bool {
        self.index.contains_key(&validator_id)
    }

    /// Voting power of a validator.
    pub fn voting_power(&self, validator_id: ValidatorId) -> Option<u64> {
        self.get(validator_id).map(|v| v.voting_power)
    }

    /// Public key of a validator.
    pub fn public_key(&self, validator_id: ValidatorId) -> Option<&PublicKey> {
        self.get(validator_id).map(|v| &v.public_key)
    }

    /// Validator IDs deterministically shuffled by an epoch randomness seed.
    ///
    /// Every validator derives the same order from the same seed.
    pub fn shuffled_ids(&self, seed: &Hash) -> Vec<ValidatorId> {
        let mut ids: Vec<ValidatorId> = self.validators.iter().map(|v| v.validator_id).collect();
        let mut rng = ChaCha20Rng::from_seed(seed.to_bytes());
        ids.shuffle(&mut rng);
        ids
    }
}

/// Errors building a [`ValidatorSet`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidatorSetError {
    /// No validators supplied.
    #[error("eligible validator set is empty")]
    Empty,

    /// Same validator listed twice.
    #[error("duplicate validator {0}")]
    Duplicate(ValidatorId),

    /// Validator with zero weight.
    #[error("validator {0} has zero voting power")]
    ZeroVotingPower(ValidatorId),

    /// Total weight does not fit in u64.
    #[error("total voting power overflows")]
    VotingPowerOverflow,
}

/// Weight required to finalize a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuorumThreshold {
    /// Strictly more than two thirds of the total weight.
    #[default]
    SuperMajority,
    /// An explicit minimum weight.
    Weight(u64),
}

impl QuorumThreshold {
    /// Minimum weight needed out of `total`.
    pub fn required_weight(self, total: u64) -> u64 {
        match self {
            QuorumThreshold::SuperMajority => {
                // Smallest w with 3w > 2 * total.
                ((total as u128) * 2 / 3 + 1) as u64
            }
            QuorumThreshold::Weight(weight) => weight,
        }
    }

    /// Check whether `voted` out of `total` satisfies the threshold.
    pub fn is_met(self, voted: u64, total: u64) -> bool {
        match self {
            QuorumThreshold::SuperMajority => VotePower::has_quorum(voted, total),
            QuorumThreshold::Weight(weight) => voted >= weight,
        }
    }

    /// Check the threshold is satisfiable and non-trivial for `total`.
    pub fn validate(self, total: u64) -> Result<(), ThresholdError> {
        match self {
            QuorumThreshold::SuperMajority => Ok(()),
            QuorumThreshold::Weight(0) => Err(ThresholdError::Zero),
            QuorumThreshold::Weight(weight) if weight > total => {
                Err(ThresholdError::Unreachable { weight, total })
            }
            QuorumThreshold::Weight(_) => Ok(()),
        }
    }
}

/// Errors validating a [`QuorumThreshold`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThresholdError {
    /// A zero threshold would finalize without signatures.
    #[error("quorum threshold of zero weight")]
    Zero,

    /// Threshold exceeds the total weight of the eligible set.
    #[error("quorum threshold {weight} exceeds total voting power {total}")]
    Unreachable {
        /// Configured weight.
        weight: u64,
        /// Total available weight.
        total: u64,
    },
}
