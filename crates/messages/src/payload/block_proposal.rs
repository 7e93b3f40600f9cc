//! Block proposal payload.

use bincode::{Decode, Encode};
use spos_types::{BlockHeader, Hash, Signature};

/// Candidate header broadcast by the round leader during the Block subround.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct BlockProposal {
    /// The proposed header.
    pub header: BlockHeader,

    /// Leader's own partial signature over the header.
    ///
    /// Only present once the leader-signs-proposal behaviour is active.
    pub leader_signature: Option<Signature>,
}

impl BlockProposal {
    /// Create a proposal without an attached leader signature.
    pub fn new(header: BlockHeader) -> Self {
        Self {
            header,
            leader_signature: None,
        }
    }

    /// Attach the leader's partial signature.
    pub fn with_leader_signature(mut self, signature: Signature) -> Self {
        self.leader_signature = Some(signature);
        self
    }

    /// Hash of the proposed header.
    pub fn header_hash(&self) -> Hash {
        self.header.hash()
    }
}
