//! Domain-specific identifier types.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validator identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode, Serialize, Deserialize,
)]
pub struct ValidatorId(pub u64);

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validator({})", self.0)
    }
}

/// Shard identifier.
///
/// The metachain is addressed through the reserved [`ShardId::METACHAIN`] value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode, Serialize, Deserialize,
)]
pub struct ShardId(pub u32);

impl ShardId {
    /// Reserved identifier of the metachain.
    pub const METACHAIN: Self = ShardId(u32::MAX);

    /// Check whether this is the metachain.
    pub fn is_metachain(self) -> bool {
        self == Self::METACHAIN
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_metachain() {
            write!(f, "Shard(META)")
        } else {
            write!(f, "Shard({})", self.0)
        }
    }
}

/// Round index.
///
/// Increases by exactly one every round duration after genesis. Never stored;
/// always recomputable from `(now - genesis) / duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Encode, Decode)]
pub struct Round(pub u64);

impl Round {
    /// The first round after genesis.
    pub const GENESIS: Self = Round(0);

    /// Get the next round.
    pub fn next(self) -> Self {
        Round(self.0 + 1)
    }

    /// Get the previous round (returns None at genesis).
    pub fn prev(self) -> Option<Self> {
        self.0.checked_sub(1).map(Round)
    }

    /// Number of rounds from `earlier` to `self` (zero if `earlier` is later).
    pub fn distance_from(self, earlier: Round) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Round({})", self.0)
    }
}

/// Epoch number.
///
/// The eligible validator set, threshold and leader seed are fixed for an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Encode, Decode)]
pub struct Epoch(pub u64);

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch({})", self.0)
    }
}

/// Vote power (stake weight).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Encode, Decode)]
pub struct VotePower(pub u64);

impl VotePower {
    /// Get the raw value.
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Calculate if we have 2f+1 quorum (>2/3 of total).
    pub fn has_quorum(voted: u64, total: u64) -> bool {
        (voted as u128) * 3 > (total as u128) * 2
    }
}

impl fmt::Display for VotePower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subround identifier.
///
/// The pipeline is fixed: `Start → Block → Signature → End`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SubroundId {
    /// Reset bookkeeping, select leader, record own role.
    Start,
    /// Obtain the candidate header from the leader.
    Block,
    /// Collect partial signatures over the candidate header.
    Signature,
    /// Assemble the finalized header or abandon the round.
    End,
}

impl SubroundId {
    /// All subrounds in pipeline order.
    pub const ALL: [SubroundId; 4] = [
        SubroundId::Start,
        SubroundId::Block,
        SubroundId::Signature,
        SubroundId::End,
    ];

    /// Position in the pipeline.
    pub fn index(self) -> usize {
        match self {
            SubroundId::Start => 0,
            SubroundId::Block => 1,
            SubroundId::Signature => 2,
            SubroundId::End => 3,
        }
    }

    /// The subround after this one, if any.
    pub fn next(self) -> Option<SubroundId> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Stable name for logs and status keys.
    pub fn name(self) -> &'static str {
        match self {
            SubroundId::Start => "start",
            SubroundId::Block => "block",
            SubroundId::Signature => "signature",
            SubroundId::End => "end",
        }
    }
}

impl fmt::Display for SubroundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
