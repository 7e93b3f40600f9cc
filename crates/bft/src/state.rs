//! Per-round consensus state.
//!
//! One [`ConsensusState`] exists per round. It is created when the scheduler
//! enters the round and dropped when the next round begins; nothing carries
//! over between rounds.

use crate::aggregator::{AggregatedSignature, SignatureAggregator};
use crate::error::{AggregationError, CandidateError};
use crate::EpochState;
use spos_core::ConsensusOutcome;
use spos_messages::{FinalizedBlock, PartialSignature};
use spos_types::{BlockHeader, Hash, Round, ShardId, SubroundId, ValidatorId};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// This node's part in a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Proposes the candidate header.
    Leader,
    /// Eligible signer that is not the leader.
    Validator,
    /// Not in the eligible set; follows along without signing.
    Observer,
}

/// Progress of one subround within the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubroundStatus {
    /// Start offset not reached yet.
    #[default]
    Pending,
    /// Job ran; waiting for the check to succeed.
    Running,
    /// Job ran and the deadline passed; checking continues until the hard limit.
    Extended,
    /// Check succeeded.
    Completed,
    /// Deadline passed without the check succeeding.
    Failed,
}

/// The accepted candidate header.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub header: BlockHeader,
    pub hash: Hash,
}

/// Mutable record of one round's progress.
pub struct ConsensusState {
    round: Round,
    round_start: Duration,
    shard: ShardId,
    epoch: Arc<EpochState>,
    self_id: ValidatorId,
    leader: ValidatorId,
    role: Role,

    candidate: Option<Candidate>,
    aggregator: Option<SignatureAggregator>,
    /// Signatures that arrived before the candidate, applied once it is set.
    early_signatures: Vec<(ValidatorId, PartialSignature)>,
    /// Verified finalized artifact received from the leader.
    leader_evidence: Option<FinalizedBlock>,
    own_signature: Option<PartialSignature>,

    subrounds: [SubroundStatus; 4],
    finalized: Option<FinalizedBlock>,
    outcome: ConsensusOutcome,
}

impl ConsensusState {
    /// Fresh state for `round`, with leader and role derived from the epoch.
    pub fn new(
        round: Round,
        round_start: Duration,
        shard: ShardId,
        epoch: Arc<EpochState>,
        self_id: ValidatorId,
    ) -> Self {
        let leader = epoch.leader_for(round);
        let role = if leader == self_id {
            Role::Leader
        } else if epoch.validators().contains(self_id) {
            Role::Validator
        } else {
            Role::Observer
        };

        Self {
            round,
            round_start,
            shard,
            epoch,
            self_id,
            leader,
            role,
            candidate: None,
            aggregator: None,
            early_signatures: Vec::new(),
            leader_evidence: None,
            own_signature: None,
            subrounds: [SubroundStatus::Pending; 4],
            finalized: None,
            outcome: ConsensusOutcome::InProgress,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn round(&self) -> Round {
        self.round
    }

    /// Start time of the round.
    pub fn round_start(&self) -> Duration {
        self.round_start
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    pub fn epoch(&self) -> &Arc<EpochState> {
        &self.epoch
    }

    pub fn self_id(&self) -> ValidatorId {
        self.self_id
    }

    pub fn leader(&self) -> ValidatorId {
        self.leader
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        self.candidate.as_ref()
    }

    /// Partial signature recorded for `signer`, if any.
    pub fn has_signature_from(&self, signer: ValidatorId) -> bool {
        self.aggregator
            .as_ref()
            .is_some_and(|agg| agg.contains(signer))
    }

    /// Signers recorded so far, in arrival order.
    pub fn signers(&self) -> Vec<ValidatorId> {
        self.aggregator
            .as_ref()
            .map(|agg| agg.signers().collect())
            .unwrap_or_default()
    }

    /// Weight of recorded signatures.
    pub fn signed_weight(&self) -> u64 {
        self.aggregator
            .as_ref()
            .map_or(0, SignatureAggregator::voting_power)
    }

    /// Own partial signature, once produced.
    pub fn own_signature(&self) -> Option<&PartialSignature> {
        self.own_signature.as_ref()
    }

    pub fn subround_status(&self, id: SubroundId) -> SubroundStatus {
        self.subrounds[id.index()]
    }

    pub fn set_subround_status(&mut self, id: SubroundId, status: SubroundStatus) {
        self.subrounds[id.index()] = status;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    pub fn finalized(&self) -> Option<&FinalizedBlock> {
        self.finalized.as_ref()
    }

    pub fn outcome(&self) -> ConsensusOutcome {
        self.outcome
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Mutation
    // ═══════════════════════════════════════════════════════════════════════

    /// Accept the candidate header for this round.
    ///
    /// Only one header is ever accepted. Offering the same header again is a
    /// no-op returning `Ok(false)`; a different header is rejected.
    pub fn set_candidate(&mut self, header: BlockHeader) -> Result<bool, CandidateError> {
        if self.is_finalized() {
            return Err(CandidateError::Finalized);
        }
        let hash = header.hash();
        if let Some(existing) = &self.candidate {
            if existing.hash == hash {
                return Ok(false);
            }
            return Err(CandidateError::Conflicting {
                existing: existing.hash,
                offered: hash,
            });
        }

        debug!(round = self.round.0, header = %hash, "Candidate accepted");
        self.aggregator = Some(SignatureAggregator::new(
            self.epoch.clone(),
            self.shard,
            self.round,
            hash,
        ));
        self.candidate = Some(Candidate { header, hash });

        for (signer, signature) in std::mem::take(&mut self.early_signatures) {
            if let Err(e) = self.add_signature(signer, signature) {
                debug!(round = self.round.0, signer = signer.0, error = %e, "Early signature rejected");
            }
        }
        Ok(true)
    }

    /// Record a partial signature.
    ///
    /// Before a candidate exists the signature is held back (one per signer)
    /// and validated once the candidate is accepted.
    pub fn add_signature(
        &mut self,
        signer: ValidatorId,
        partial: PartialSignature,
    ) -> Result<(), AggregationError> {
        if self.is_finalized() {
            return Err(AggregationError::Finalized);
        }
        let Some(candidate) = &self.candidate else {
            if !self.epoch.validators().contains(signer) {
                return Err(AggregationError::UnknownSigner(signer));
            }
            if self.early_signatures.iter().any(|(s, _)| *s == signer) {
                return Err(AggregationError::DuplicateSigner(signer));
            }
            self.early_signatures.push((signer, partial));
            return Ok(());
        };
        if partial.header_hash != candidate.hash {
            return Err(AggregationError::InvalidSignature(signer));
        }

        match self.aggregator.as_mut() {
            Some(aggregator) => aggregator.add(signer, partial.signature).map(|_| ()),
            None => Err(AggregationError::InvalidSignature(signer)),
        }
    }

    /// Record this node's own partial signature.
    pub fn add_own_signature(&mut self, partial: PartialSignature) -> Result<(), AggregationError> {
        self.add_signature(self.self_id, partial.clone())?;
        self.own_signature = Some(partial);
        Ok(())
    }

    /// Record a verified finalized block from the leader as quorum evidence.
    ///
    /// The block must be for the accepted candidate.
    pub fn accept_leader_evidence(&mut self, block: FinalizedBlock) -> Result<(), CandidateError> {
        if self.is_finalized() {
            return Err(CandidateError::Finalized);
        }
        let offered = block.header.hash();
        match &self.candidate {
            Some(candidate) if candidate.hash == offered => {
                self.leader_evidence = Some(block);
                Ok(())
            }
            Some(candidate) => Err(CandidateError::Conflicting {
                existing: candidate.hash,
                offered,
            }),
            None => {
                self.set_candidate(block.header.clone())?;
                self.leader_evidence = Some(block);
                Ok(())
            }
        }
    }

    /// Whether enough signature weight, or verified leader evidence, exists.
    pub fn has_quorum(&self) -> bool {
        self.leader_evidence.is_some()
            || self
                .aggregator
                .as_ref()
                .is_some_and(SignatureAggregator::has_quorum)
    }

    /// Assemble the finalized block and freeze the state.
    ///
    /// Uses locally collected signatures when they reach quorum, otherwise the
    /// leader's verified artifact.
    pub fn finalize(&mut self) -> Result<FinalizedBlock, AggregationError> {
        if let Some(block) = &self.finalized {
            return Ok(block.clone());
        }
        let Some(header) = self.candidate.as_ref().map(|c| c.header.clone()) else {
            return Err(AggregationError::InsufficientSignatures {
                have: 0,
                need: self.epoch.required_weight(),
            });
        };

        let local_quorum = self
            .aggregator
            .as_ref()
            .is_some_and(SignatureAggregator::has_quorum);
        let block = if local_quorum {
            let aggregator = self
                .aggregator
                .as_mut()
                .ok_or(AggregationError::Finalized)?;
            let AggregatedSignature {
                signature,
                signers,
                voting_power,
            } = aggregator.aggregate()?;
            FinalizedBlock {
                header,
                aggregated_signature: signature,
                signers,
                voting_power,
            }
        } else if let Some(block) = self.leader_evidence.take() {
            block
        } else {
            return Err(AggregationError::InsufficientSignatures {
                have: self.signed_weight(),
                need: self.epoch.required_weight(),
            });
        };

        self.finalized = Some(block.clone());
        self.outcome = ConsensusOutcome::Finalized;
        Ok(block)
    }

    /// Close the round without a finalized header.
    pub fn abandon(&mut self) {
        if self.outcome == ConsensusOutcome::InProgress {
            self.outcome = ConsensusOutcome::Abandoned;
        }
    }
}
