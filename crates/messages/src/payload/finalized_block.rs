//! Finalized block payload.

use bincode::{Decode, Encode};
use spos_types::{BlockHeader, Signature, SignerBitfield};

/// Finalized header together with the aggregated signature proving quorum.
///
/// Handed to the block-commit collaborator and broadcast by the leader in the
/// End subround.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct FinalizedBlock {
    /// The finalized header.
    pub header: BlockHeader,

    /// BLS aggregate of the signers' partial signatures.
    pub aggregated_signature: Signature,

    /// Which validators contributed to the aggregate.
    pub signers: SignerBitfield,

    /// Total voting power behind the aggregate.
    pub voting_power: u64,
}
