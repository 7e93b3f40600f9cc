//! Partial signature payload.

use bincode::{Decode, Encode};
use spos_types::{Hash, Signature};

/// A validator's BLS signature over the candidate header of a round.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct PartialSignature {
    /// Hash of the header being signed.
    pub header_hash: Hash,

    /// Signature over the header signing message.
    pub signature: Signature,
}

impl PartialSignature {
    /// Create a new partial signature payload.
    pub fn new(header_hash: Hash, signature: Signature) -> Self {
        Self {
            header_hash,
            signature,
        }
    }
}
