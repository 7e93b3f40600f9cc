//! Block header proposed and signed during a round.

use crate::{Epoch, Hash, Round, ShardId, ValidatorId};
use bincode::{Decode, Encode};

/// Block header containing consensus metadata.
///
/// The header is what validators sign. The body it commits to is built and
/// executed by the block-assembly collaborator; consensus only sees its root.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct BlockHeader {
    /// Shard the header belongs to.
    pub shard: ShardId,

    /// Epoch in which the header was proposed.
    pub epoch: Epoch,

    /// Round in which the header was proposed.
    pub round: Round,

    /// Block nonce (height) in the chain.
    pub nonce: u64,

    /// Hash of the previous finalized header.
    pub prev_hash: Hash,

    /// Validator that proposed this header.
    pub proposer: ValidatorId,

    /// Unix timestamp (milliseconds) of the proposing round's start.
    pub timestamp_ms: u64,

    /// Root of the block body (transactions, receipts).
    pub body_root: Hash,
}

impl BlockHeader {
    /// Compute hash of this block header.
    pub fn hash(&self) -> Hash {
        Hash::from_parts(&[
            &self.shard.0.to_le_bytes(),
            &self.epoch.0.to_le_bytes(),
            &self.round.0.to_le_bytes(),
            &self.nonce.to_le_bytes(),
            self.prev_hash.as_bytes(),
            &self.proposer.0.to_le_bytes(),
            &self.timestamp_ms.to_le_bytes(),
            self.body_root.as_bytes(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> BlockHeader {
        BlockHeader {
            shard: ShardId(0),
            epoch: Epoch(1),
            round: Round(5),
            nonce: 4,
            prev_hash: Hash::from_bytes(b"parent"),
            proposer: ValidatorId(2),
            timestamp_ms: 1_700_000_025_000,
            body_root: Hash::from_bytes(b"body"),
        }
    }

    #[test]
    fn test_header_hash_deterministic() {
        assert_eq!(header().hash(), header().hash());
    }

    #[test]
    fn test_header_hash_covers_every_field() {
        let base = header().hash();

        let mut h = header();
        h.round = Round(6);
        assert_ne!(h.hash(), base);

        let mut h = header();
        h.proposer = ValidatorId(3);
        assert_ne!(h.hash(), base);

        let mut h = header();
        h.body_root = Hash::ZERO;
        assert_ne!(h.hash(), base);
    }
}
