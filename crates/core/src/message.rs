//! Outbound message types for network communication.

use spos_messages::ConsensusMessage;
use spos_types::{consensus_topic, Round, ShardId, ValidatorId};

/// Outbound consensus messages.
///
/// Each variant wraps a signed envelope whose payload has the matching type.
/// The runner handles the actual network I/O.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Candidate header from the round leader.
    BlockProposal(ConsensusMessage),

    /// Partial signature over the candidate header.
    PartialSignature(ConsensusMessage),

    /// Finalized header with aggregated signature.
    FinalizedBlock(ConsensusMessage),
}

impl OutboundMessage {
    /// Get a human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::BlockProposal(_) => "BlockProposal",
            OutboundMessage::PartialSignature(_) => "PartialSignature",
            OutboundMessage::FinalizedBlock(_) => "FinalizedBlock",
        }
    }

    /// The signed envelope.
    pub fn message(&self) -> &ConsensusMessage {
        match self {
            OutboundMessage::BlockProposal(m)
            | OutboundMessage::PartialSignature(m)
            | OutboundMessage::FinalizedBlock(m) => m,
        }
    }

    /// Consume and return the signed envelope.
    pub fn into_message(self) -> ConsensusMessage {
        match self {
            OutboundMessage::BlockProposal(m)
            | OutboundMessage::PartialSignature(m)
            | OutboundMessage::FinalizedBlock(m) => m,
        }
    }

    /// Round the message belongs to.
    pub fn round(&self) -> Round {
        self.message().round
    }

    /// Sending validator.
    pub fn sender(&self) -> ValidatorId {
        self.message().sender
    }

    /// Topic the message is published on.
    pub fn topic(&self, shard: ShardId) -> String {
        consensus_topic(shard)
    }
}
