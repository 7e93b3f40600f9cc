//! Partial signature collection and BLS aggregation.

use crate::error::AggregationError;
use crate::EpochState;
use indexmap::IndexMap;
use spos_messages::FinalizedBlock;
use spos_types::{
    header_signature_message, Hash, PublicKey, Round, ShardId, Signature, SignerBitfield,
    ValidatorId,
};
use std::sync::Arc;
use tracing::debug;

/// Result of aggregating a quorum of partial signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedSignature {
    /// BLS aggregate of every recorded partial signature.
    pub signature: Signature,
    /// Which validators contributed.
    pub signers: SignerBitfield,
    /// Their total voting power.
    pub voting_power: u64,
}

/// Accumulates partial signatures over one header toward the quorum threshold.
///
/// Each signer counts once. Weight only ever grows by the voting power of a
/// distinct, cryptographically valid, eligible signer.
pub struct SignatureAggregator {
    epoch: Arc<EpochState>,
    round: Round,
    header_hash: Hash,
    signing_message: Vec<u8>,
    signatures: IndexMap<ValidatorId, Signature>,
    voting_power: u64,
    aggregated: Option<AggregatedSignature>,
}

impl SignatureAggregator {
    /// Create an aggregator for signatures over `header_hash` in `round`.
    pub fn new(epoch: Arc<EpochState>, shard: ShardId, round: Round, header_hash: Hash) -> Self {
        let signing_message = header_signature_message(shard, epoch.epoch(), round, &header_hash);
        Self {
            epoch,
            round,
            header_hash,
            signing_message,
            signatures: IndexMap::new(),
            voting_power: 0,
            aggregated: None,
        }
    }

    /// The message every partial signature must cover.
    pub fn signing_message(&self) -> &[u8] {
        &self.signing_message
    }

    pub fn header_hash(&self) -> Hash {
        self.header_hash
    }

    /// Record a partial signature. Returns the accumulated weight.
    pub fn add(&mut self, signer: ValidatorId, signature: Signature) -> Result<u64, AggregationError> {
        if self.aggregated.is_some() {
            return Err(AggregationError::Finalized);
        }
        let info = self
            .epoch
            .validators()
            .get(signer)
            .ok_or(AggregationError::UnknownSigner(signer))?;
        if self.signatures.contains_key(&signer) {
            return Err(AggregationError::DuplicateSigner(signer));
        }
        if !info.public_key.verify(&self.signing_message, &signature) {
            return Err(AggregationError::InvalidSignature(signer));
        }

        self.voting_power += info.voting_power;
        self.signatures.insert(signer, signature);

        debug!(
            round = self.round.0,
            signer = signer.0,
            voting_power = self.voting_power,
            required = self.epoch.required_weight(),
            "Partial signature recorded"
        );
        Ok(self.voting_power)
    }

    /// Whether the recorded weight meets the threshold.
    pub fn has_quorum(&self) -> bool {
        self.epoch.has_quorum(self.voting_power)
    }

    /// Weight of recorded signers.
    pub fn voting_power(&self) -> u64 {
        self.voting_power
    }

    /// Number of recorded signers.
    pub fn signer_count(&self) -> usize {
        self.signatures.len()
    }

    pub fn contains(&self, signer: ValidatorId) -> bool {
        self.signatures.contains_key(&signer)
    }

    /// Recorded signers in arrival order.
    pub fn signers(&self) -> impl Iterator<Item = ValidatorId> + '_ {
        self.signatures.keys().copied()
    }

    /// Combine the recorded signatures.
    ///
    /// Once aggregated, the result is fixed: later calls return the same value
    /// and further signatures are refused.
    pub fn aggregate(&mut self) -> Result<AggregatedSignature, AggregationError> {
        if let Some(aggregated) = &self.aggregated {
            return Ok(aggregated.clone());
        }
        if !self.has_quorum() {
            return Err(AggregationError::InsufficientSignatures {
                have: self.voting_power,
                need: self.epoch.required_weight(),
            });
        }

        let validators = self.epoch.validators();
        let mut signers = SignerBitfield::new(validators.len());
        for id in self.signatures.keys() {
            if let Some(index) = validators.index_of(*id) {
                signers.set(index);
            }
        }
        let signatures: Vec<Signature> = self.signatures.values().cloned().collect();
        let signature = Signature::aggregate(&signatures)?;

        let aggregated = AggregatedSignature {
            signature,
            signers,
            voting_power: self.voting_power,
        };
        self.aggregated = Some(aggregated.clone());
        Ok(aggregated)
    }
}

/// Verify a finalized block's aggregated signature against the epoch.
///
/// Checks the signer bitfield matches the eligible set, the claimed weight
/// matches the signers and meets the threshold, and the aggregate verifies
/// against the signers' aggregated public key. Returns the signer weight.
pub fn verify_finalized(
    epoch: &EpochState,
    shard: ShardId,
    block: &FinalizedBlock,
) -> Result<u64, AggregationError> {
    let validators = epoch.validators();
    if block.signers.num_validators() != validators.len() {
        return Err(AggregationError::InvalidAggregate(format!(
            "bitfield covers {} validators, eligible set has {}",
            block.signers.num_validators(),
            validators.len()
        )));
    }

    let mut weight = 0u64;
    let mut keys: Vec<PublicKey> = Vec::with_capacity(block.signers.count());
    for index in block.signers.set_indices() {
        let info = validators.at(index).ok_or_else(|| {
            AggregationError::InvalidAggregate(format!("signer index {index} out of range"))
        })?;
        weight += info.voting_power;
        keys.push(info.public_key.clone());
    }

    if weight != block.voting_power {
        return Err(AggregationError::InvalidAggregate(format!(
            "claimed voting power {} but signers carry {weight}",
            block.voting_power
        )));
    }
    if !epoch.has_quorum(weight) {
        return Err(AggregationError::InsufficientSignatures {
            have: weight,
            need: epoch.required_weight(),
        });
    }

    let aggregated_key = PublicKey::aggregate(&keys)?;
    let message = header_signature_message(
        shard,
        block.header.epoch,
        block.header.round,
        &block.header.hash(),
    );
    if !aggregated_key.verify(&message, &block.aggregated_signature) {
        return Err(AggregationError::InvalidAggregate(
            "aggregated signature does not verify".into(),
        ));
    }
    Ok(weight)
}
