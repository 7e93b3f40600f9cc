//! Per-node chain record.

use parking_lot::Mutex;
use spos_core::{BlockAssembler, BlockCommitter, ProposalRequest};
use spos_messages::FinalizedBlock;
use spos_types::{BlockHeader, Hash, Round};
use tracing::debug;

/// Builds headers on top of the last commit and records every commit.
///
/// A header further ahead than the next height is accepted, so a node that
/// missed rounds keeps following the others.
#[derive(Debug, Default)]
pub struct SimChain {
    committed: Mutex<Vec<FinalizedBlock>>,
}

impl SimChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Height of the last committed header, 0 before any commit.
    pub fn height(&self) -> u64 {
        self.committed
            .lock()
            .last()
            .map_or(0, |block| block.header.nonce)
    }

    pub fn tip_hash(&self) -> Hash {
        self.committed
            .lock()
            .last()
            .map_or(Hash::ZERO, |block| block.header.hash())
    }

    /// Every committed block, in commit order.
    pub fn committed(&self) -> Vec<FinalizedBlock> {
        self.committed.lock().clone()
    }

    /// Hashes of committed headers, in commit order.
    pub fn committed_hashes(&self) -> Vec<Hash> {
        self.committed
            .lock()
            .iter()
            .map(|block| block.header.hash())
            .collect()
    }

    /// Committed block of `round`, if any.
    pub fn committed_at(&self, round: Round) -> Option<FinalizedBlock> {
        self.committed
            .lock()
            .iter()
            .find(|block| block.header.round == round)
            .cloned()
    }
}

impl BlockAssembler for SimChain {
    fn assemble(&self, request: &ProposalRequest) -> Option<BlockHeader> {
        Some(BlockHeader {
            shard: request.shard,
            epoch: request.epoch,
            round: request.round,
            nonce: self.height() + 1,
            prev_hash: self.tip_hash(),
            proposer: request.proposer,
            timestamp_ms: request.timestamp_ms,
            body_root: Hash::from_parts(&[b"sim-body".as_slice(), &request.round.0.to_le_bytes()]),
        })
    }

    fn validate(&self, header: &BlockHeader) -> bool {
        let height = self.height();
        if header.nonce <= height {
            return false;
        }
        header.nonce > height + 1 || header.prev_hash == self.tip_hash()
    }
}

impl BlockCommitter for SimChain {
    fn commit(&self, block: &FinalizedBlock) {
        let mut committed = self.committed.lock();
        if committed
            .last()
            .is_some_and(|last| block.header.nonce <= last.header.nonce)
        {
            debug!(nonce = block.header.nonce, "Ignoring commit below tip");
            return;
        }
        committed.push(block.clone());
    }
}
