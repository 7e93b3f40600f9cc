//! In-memory chain tip.
//!
//! Builds empty-body headers on top of the last committed header and accepts
//! finalized headers. Enough to drive a devnet; execution and persistence sit
//! behind the same two traits in a full node.

use parking_lot::Mutex;
use spos_core::{BlockAssembler, BlockCommitter, ProposalRequest};
use spos_messages::FinalizedBlock;
use spos_types::{BlockHeader, Hash, Round};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tip {
    hash: Hash,
    height: u64,
    round: Option<Round>,
}

/// Chain tip shared by the assembler and the committer of one node.
#[derive(Debug)]
pub struct LocalChain {
    tip: Mutex<Tip>,
}

impl Default for LocalChain {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalChain {
    pub fn new() -> Self {
        Self {
            tip: Mutex::new(Tip {
                hash: Hash::ZERO,
                height: 0,
                round: None,
            }),
        }
    }

    /// Number of committed headers.
    pub fn height(&self) -> u64 {
        self.tip.lock().height
    }

    pub fn tip_hash(&self) -> Hash {
        self.tip.lock().hash
    }

    /// Round of the last committed header.
    pub fn last_round(&self) -> Option<Round> {
        self.tip.lock().round
    }
}

fn empty_body_root(round: Round) -> Hash {
    Hash::from_parts(&[b"spos-empty-body".as_slice(), &round.0.to_le_bytes()])
}

impl BlockAssembler for LocalChain {
    fn assemble(&self, request: &ProposalRequest) -> Option<BlockHeader> {
        let tip = *self.tip.lock();
        Some(BlockHeader {
            shard: request.shard,
            epoch: request.epoch,
            round: request.round,
            nonce: tip.height + 1,
            prev_hash: tip.hash,
            proposer: request.proposer,
            timestamp_ms: request.timestamp_ms,
            body_root: empty_body_root(request.round),
        })
    }

    fn validate(&self, header: &BlockHeader) -> bool {
        let tip = *self.tip.lock();
        if header.nonce <= tip.height {
            debug!(nonce = header.nonce, height = tip.height, "Header below tip");
            return false;
        }
        if tip.round.is_some_and(|r| header.round <= r) {
            debug!(round = header.round.0, "Header not after last committed round");
            return false;
        }
        if header.nonce == tip.height + 1 && header.prev_hash != tip.hash {
            debug!(nonce = header.nonce, "Header does not extend tip");
            return false;
        }
        // A header further ahead means this node missed commits; accept it
        // and catch up on commit.
        header.body_root == empty_body_root(header.round)
    }
}

impl BlockCommitter for LocalChain {
    fn commit(&self, block: &FinalizedBlock) {
        let header = &block.header;
        let mut tip = self.tip.lock();
        if header.nonce <= tip.height {
            warn!(
                nonce = header.nonce,
                height = tip.height,
                "Ignoring commit below tip"
            );
            return;
        }
        if header.nonce > tip.height + 1 {
            warn!(
                nonce = header.nonce,
                height = tip.height,
                "Committing past a gap"
            );
        }
        *tip = Tip {
            hash: header.hash(),
            height: header.nonce,
            round: Some(header.round),
        };
        info!(
            round = header.round.0,
            height = header.nonce,
            signers = block.signers.count(),
            "Block committed"
        );
    }
}
