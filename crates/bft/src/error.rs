//! Boundary errors of the consensus pipeline.
//!
//! None of these are fatal: they reject one input and leave every other
//! contribution untouched.

use spos_messages::MessageError;
use spos_types::{CryptoError, Hash, Round, ValidatorId};
use thiserror::Error;

/// Errors adding or aggregating partial signatures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("{0} already signed this round")]
    DuplicateSigner(ValidatorId),

    #[error("{0} is not in the eligible set")]
    UnknownSigner(ValidatorId),

    #[error("invalid signature from {0}")]
    InvalidSignature(ValidatorId),

    #[error("insufficient signatures: have weight {have}, need {need}")]
    InsufficientSignatures { have: u64, need: u64 },

    #[error("aggregation already finalized")]
    Finalized,

    #[error("invalid aggregate: {0}")]
    InvalidAggregate(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Errors accepting a candidate header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CandidateError {
    #[error("conflicting candidate {offered}, already accepted {existing}")]
    Conflicting { existing: Hash, offered: Hash },

    #[error("round already finalized")]
    Finalized,
}

/// Reasons an inbound message is rejected before reaching consensus state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InboundError {
    #[error("message for {message_round} is behind current {current}")]
    StaleRound { message_round: Round, current: Round },

    #[error("message for {message_round} is beyond the buffering horizon of {current}")]
    BeyondHorizon { message_round: Round, current: Round },

    #[error("sender {0} is not an eligible validator")]
    UnknownSender(ValidatorId),

    #[error("invalid envelope signature from {0}")]
    InvalidSignature(ValidatorId),

    #[error("malformed message: {0}")]
    Malformed(#[from] MessageError),

    #[error("second {kind} from {sender} in the same round")]
    Duplicate {
        sender: ValidatorId,
        kind: &'static str,
    },

    #[error("inbox for {sender} in {round} is full")]
    InboxFull { round: Round, sender: ValidatorId },
}

impl InboundError {
    /// Short stable reason for status reporting.
    pub fn reason(&self) -> &'static str {
        match self {
            InboundError::StaleRound { .. } => "stale_round",
            InboundError::BeyondHorizon { .. } => "beyond_horizon",
            InboundError::UnknownSender(_) => "unknown_sender",
            InboundError::InvalidSignature(_) => "invalid_signature",
            InboundError::Malformed(_) => "malformed",
            InboundError::Duplicate { .. } => "duplicate",
            InboundError::InboxFull { .. } => "inbox_full",
        }
    }
}
