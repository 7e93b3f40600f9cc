//! Deterministic fixtures for tests.
//!
//! Keys are derived from fixed seeds so every run (and every node in a
//! simulation) sees the same validator set.

use spos_core::{BlockAssembler, ProposalRequest};
use spos_messages::{ConsensusMessage, PartialSignature, Payload};
use spos_types::{
    header_signature_message, BlockHeader, Epoch, Hash, KeyPair, Round, ShardId, ValidatorId,
    ValidatorInfo, ValidatorSet,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A validator set together with the signing keys of its members.
///
/// `keys[i]` belongs to the validator at position `i` of `set`.
#[derive(Clone)]
pub struct TestValidators {
    pub keys: Vec<KeyPair>,
    pub set: ValidatorSet,
}

impl TestValidators {
    /// Signing key of `id`. Panics if `id` is not in the set.
    pub fn key(&self, id: ValidatorId) -> &KeyPair {
        let index = self
            .set
            .index_of(id)
            .unwrap_or_else(|| panic!("{id} is not in the test validator set"));
        &self.keys[index]
    }
}

/// Key derived from a fixed seed. The same `n` always yields the same key.
pub fn deterministic_key(n: u64) -> KeyPair {
    let mut seed = [0u8; 32];
    seed[..8].copy_from_slice(&n.to_le_bytes());
    seed[8..16].copy_from_slice(b"spostest");
    KeyPair::from_seed(&seed).expect("fixed seed is a valid key")
}

fn build(ids: impl Iterator<Item = (u64, u64)>) -> TestValidators {
    let mut keys = Vec::new();
    let mut infos = Vec::new();
    for (id, voting_power) in ids {
        let key = deterministic_key(id);
        infos.push(ValidatorInfo {
            validator_id: ValidatorId(id),
            public_key: key.public_key(),
            voting_power,
        });
        keys.push(key);
    }
    TestValidators {
        keys,
        set: ValidatorSet::new(infos).expect("test validator set is valid"),
    }
}

/// `n` validators with ids `0..n` and voting power 1.
pub fn validator_set(n: usize) -> TestValidators {
    validator_set_from(0, n)
}

/// `n` validators with ids `first..first + n` and voting power 1.
pub fn validator_set_from(first: u64, n: usize) -> TestValidators {
    build((first..first + n as u64).map(|id| (id, 1)))
}

/// Validators with ids `0..powers.len()` and the given voting powers.
pub fn weighted_validator_set(powers: &[u64]) -> TestValidators {
    build(powers.iter().enumerate().map(|(i, p)| (i as u64, *p)))
}

/// A structurally valid header for the given round.
pub fn test_header(shard: ShardId, epoch: Epoch, round: Round, proposer: ValidatorId) -> BlockHeader {
    BlockHeader {
        shard,
        epoch,
        round,
        nonce: round.0 + 1,
        prev_hash: Hash::from_parts(&[b"prev".as_slice(), &round.0.to_le_bytes()]),
        proposer,
        timestamp_ms: 0,
        body_root: Hash::from_parts(&[b"body".as_slice(), &round.0.to_le_bytes()]),
    }
}

/// Partial signature by `key` over `header`.
pub fn sign_header(key: &KeyPair, shard: ShardId, header: &BlockHeader) -> PartialSignature {
    let hash = header.hash();
    let message = header_signature_message(shard, header.epoch, header.round, &hash);
    PartialSignature::new(hash, key.sign(&message))
}

/// Consensus message from `sender`, signed by `key`.
pub fn signed_message(
    key: &KeyPair,
    shard: ShardId,
    round: Round,
    sender: ValidatorId,
    payload: impl Into<Payload>,
) -> ConsensusMessage {
    ConsensusMessage::sign(shard, round, sender, &payload.into(), key)
        .expect("test payload encodes")
}

/// Block assembler that builds [`test_header`]s.
///
/// Counts assembly calls. Can be told to produce nothing or to reject every
/// header it validates.
#[derive(Debug)]
pub struct TestAssembler {
    produce: AtomicBool,
    accept: AtomicBool,
    assembled: AtomicU64,
}

impl Default for TestAssembler {
    fn default() -> Self {
        Self {
            produce: AtomicBool::new(true),
            accept: AtomicBool::new(true),
            assembled: AtomicU64::new(0),
        }
    }
}

impl TestAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_produce(&self, produce: bool) {
        self.produce.store(produce, Ordering::SeqCst);
    }

    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    /// Number of headers assembled so far.
    pub fn assembled(&self) -> u64 {
        self.assembled.load(Ordering::SeqCst)
    }
}

impl BlockAssembler for TestAssembler {
    fn assemble(&self, request: &ProposalRequest) -> Option<BlockHeader> {
        if !self.produce.load(Ordering::SeqCst) {
            return None;
        }
        self.assembled.fetch_add(1, Ordering::SeqCst);
        let mut header = test_header(request.shard, request.epoch, request.round, request.proposer);
        header.timestamp_ms = request.timestamp_ms;
        Some(header)
    }

    fn validate(&self, _header: &BlockHeader) -> bool {
        self.accept.load(Ordering::SeqCst)
    }
}
