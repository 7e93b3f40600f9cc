//! Typed payloads carried by consensus messages.
//!
//! Each payload belongs to exactly one subround of the pipeline.

mod block_proposal;
mod finalized_block;
mod partial_signature;

pub use block_proposal::BlockProposal;
pub use finalized_block::FinalizedBlock;
pub use partial_signature::PartialSignature;

use bincode::{Decode, Encode};
use spos_types::{Round, SubroundId};

/// Payload of a consensus message.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum Payload {
    /// Candidate header proposed by the round leader.
    BlockProposal(BlockProposal),

    /// A validator's partial signature over the candidate header.
    PartialSignature(PartialSignature),

    /// Finalized header with the aggregated signature.
    FinalizedBlock(FinalizedBlock),
}

impl Payload {
    /// Subround this payload is produced in.
    pub fn subround(&self) -> SubroundId {
        match self {
            Payload::BlockProposal(_) => SubroundId::Block,
            Payload::PartialSignature(_) => SubroundId::Signature,
            Payload::FinalizedBlock(_) => SubroundId::End,
        }
    }

    /// Get a human-readable name for this payload type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Payload::BlockProposal(_) => "block.proposal",
            Payload::PartialSignature(_) => "block.signature",
            Payload::FinalizedBlock(_) => "block.finalized",
        }
    }

    /// Round embedded in the payload, when it carries a header.
    pub fn header_round(&self) -> Option<Round> {
        match self {
            Payload::BlockProposal(p) => Some(p.header.round),
            Payload::FinalizedBlock(f) => Some(f.header.round),
            Payload::PartialSignature(_) => None,
        }
    }
}

impl From<BlockProposal> for Payload {
    fn from(value: BlockProposal) -> Self {
        Payload::BlockProposal(value)
    }
}

impl From<PartialSignature> for Payload {
    fn from(value: PartialSignature) -> Self {
        Payload::PartialSignature(value)
    }
}

impl From<FinalizedBlock> for Payload {
    fn from(value: FinalizedBlock) -> Self {
        Payload::FinalizedBlock(value)
    }
}
