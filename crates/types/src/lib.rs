//! Core types for SPOS round consensus.
//!
//! This crate provides the foundational types used throughout the consensus
//! implementation:
//!
//! - **Primitives**: Hash, BLS keys, signatures and aggregation
//! - **Identifiers**: ValidatorId, ShardId, Round, Epoch, SubroundId
//! - **Consensus types**: BlockHeader, ValidatorSet, QuorumThreshold, SignerBitfield
//! - **Naming**: consensus topic derivation per shard
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend on
//! any other workspace crates, making it the foundation layer.

mod crypto;
mod hash;
mod header;
mod identifiers;
mod signer_bitfield;
mod signing;
mod topic;
mod validator;

pub use crypto::{CryptoError, KeyPair, PublicKey, Signature};
pub use hash::{Hash, HexError};
pub use header::BlockHeader;
pub use identifiers::{Epoch, Round, ShardId, SubroundId, ValidatorId, VotePower};
pub use signer_bitfield::SignerBitfield;
pub use signing::{
    consensus_message_signing_bytes, header_signature_message, DOMAIN_CONSENSUS_MESSAGE,
    DOMAIN_HEADER_SIGNATURE,
};
pub use topic::{communication_identifier, consensus_topic, CONSENSUS_TOPIC_PREFIX};
pub use validator::{
    QuorumThreshold, ThresholdError, ValidatorInfo, ValidatorSet, ValidatorSetError,
};
