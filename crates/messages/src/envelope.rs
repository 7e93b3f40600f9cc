//! Signed consensus message envelope.

use crate::Payload;
use bincode::config::Config;
use bincode::{Decode, Encode};
use spos_types::{
    consensus_message_signing_bytes, KeyPair, PublicKey, Round, ShardId, Signature, SubroundId,
    ValidatorId,
};
use thiserror::Error;

/// Largest encoded payload accepted from the network.
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;

/// Largest encoded envelope accepted from the network.
const MAX_ENVELOPE_BYTES: usize = MAX_PAYLOAD_BYTES + 1024;

fn payload_config() -> impl Config {
    bincode::config::standard().with_limit::<MAX_PAYLOAD_BYTES>()
}

fn envelope_config() -> impl Config {
    bincode::config::standard().with_limit::<MAX_ENVELOPE_BYTES>()
}

/// Errors raised while building or opening a consensus message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Payload of {size} bytes exceeds limit of {max}")]
    TooLarge { size: usize, max: usize },

    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    #[error("Envelope subround {envelope} does not match payload subround {payload}")]
    SubroundMismatch {
        envelope: SubroundId,
        payload: SubroundId,
    },

    #[error("Envelope round {envelope} does not match header round {payload}")]
    RoundMismatch { envelope: Round, payload: Round },
}

/// A consensus message as exchanged on the shard's consensus topic.
///
/// The signature covers the shard, round, subround, sender and a hash of the
/// encoded payload. The transport authenticates the sender; the signature
/// binds the payload to its position in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ConsensusMessage {
    /// Round the message belongs to.
    pub round: Round,

    /// Subround that produced the message.
    pub subround: SubroundId,

    /// Sending validator.
    pub sender: ValidatorId,

    /// Encoded [`Payload`].
    pub payload: Vec<u8>,

    /// Sender's signature over the envelope signing bytes.
    pub signature: Signature,
}

impl ConsensusMessage {
    /// Encode and sign a payload.
    pub fn sign(
        shard: ShardId,
        round: Round,
        sender: ValidatorId,
        payload: &Payload,
        signing_key: &KeyPair,
    ) -> Result<Self, MessageError> {
        let bytes = bincode::encode_to_vec(payload, payload_config())
            .map_err(|e| MessageError::Encode(e.to_string()))?;
        if bytes.len() > MAX_PAYLOAD_BYTES {
            return Err(MessageError::TooLarge {
                size: bytes.len(),
                max: MAX_PAYLOAD_BYTES,
            });
        }

        let subround = payload.subround();
        let signature = signing_key.sign(&consensus_message_signing_bytes(
            shard, round, subround, sender, &bytes,
        ));

        Ok(Self {
            round,
            subround,
            sender,
            payload: bytes,
            signature,
        })
    }

    /// Verify the envelope signature against the sender's public key.
    pub fn verify(&self, shard: ShardId, public_key: &PublicKey) -> bool {
        let message = consensus_message_signing_bytes(
            shard,
            self.round,
            self.subround,
            self.sender,
            &self.payload,
        );
        public_key.verify(&message, &self.signature)
    }

    /// Decode the typed payload and check it is consistent with the envelope.
    pub fn decode_payload(&self) -> Result<Payload, MessageError> {
        if self.payload.len() > MAX_PAYLOAD_BYTES {
            return Err(MessageError::TooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_BYTES,
            });
        }

        let (payload, read): (Payload, usize) =
            bincode::decode_from_slice(&self.payload, payload_config())
                .map_err(|e| MessageError::Decode(e.to_string()))?;
        if read != self.payload.len() {
            return Err(MessageError::TrailingBytes(self.payload.len() - read));
        }

        if payload.subround() != self.subround {
            return Err(MessageError::SubroundMismatch {
                envelope: self.subround,
                payload: payload.subround(),
            });
        }
        if let Some(header_round) = payload.header_round() {
            if header_round != self.round {
                return Err(MessageError::RoundMismatch {
                    envelope: self.round,
                    payload: header_round,
                });
            }
        }

        Ok(payload)
    }

    /// Encode the whole envelope.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        bincode::encode_to_vec(self, envelope_config())
            .map_err(|e| MessageError::Encode(e.to_string()))
    }

    /// Decode a whole envelope.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        let (message, read): (Self, usize) = bincode::decode_from_slice(bytes, envelope_config())
            .map_err(|e| MessageError::Decode(e.to_string()))?;
        if read != bytes.len() {
            return Err(MessageError::TrailingBytes(bytes.len() - read));
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockProposal, PartialSignature};
    use spos_types::{BlockHeader, Epoch, Hash};

    fn key(seed: u8) -> KeyPair {
        KeyPair::from_seed(&[seed; 32]).unwrap()
    }

    fn header(round: u64) -> BlockHeader {
        BlockHeader {
            shard: ShardId(0),
            epoch: Epoch(0),
            round: Round(round),
            nonce: round,
            prev_hash: Hash::ZERO,
            proposer: ValidatorId(1),
            timestamp_ms: 0,
            body_root: Hash::from_bytes(b"body"),
        }
    }

    #[test]
    fn test_sign_verify_decode() {
        let k = key(1);
        let payload = Payload::from(BlockProposal::new(header(3)));
        let msg =
            ConsensusMessage::sign(ShardId(0), Round(3), ValidatorId(1), &payload, &k).unwrap();

        assert_eq!(msg.subround, SubroundId::Block);
        assert!(msg.verify(ShardId(0), &k.public_key()));
        assert!(!msg.verify(ShardId(1), &k.public_key()));
        assert!(!msg.verify(ShardId(0), &key(2).public_key()));
        assert_eq!(msg.decode_payload().unwrap(), payload);
    }

    #[test]
    fn test_retagged_envelope_fails_verification() {
        let k = key(1);
        let payload = Payload::from(PartialSignature::new(
            Hash::from_bytes(b"h"),
            k.sign(b"h"),
        ));
        let mut msg =
            ConsensusMessage::sign(ShardId(0), Round(3), ValidatorId(1), &payload, &k).unwrap();

        msg.round = Round(4);
        assert!(!msg.verify(ShardId(0), &k.public_key()));
    }

    #[test]
    fn test_decode_rejects_subround_mismatch() {
        let k = key(1);
        let payload = Payload::from(BlockProposal::new(header(3)));
        let mut msg =
            ConsensusMessage::sign(ShardId(0), Round(3), ValidatorId(1), &payload, &k).unwrap();
        msg.subround = SubroundId::Signature;

        assert_eq!(
            msg.decode_payload(),
            Err(MessageError::SubroundMismatch {
                envelope: SubroundId::Signature,
                payload: SubroundId::Block,
            })
        );
    }

    #[test]
    fn test_decode_rejects_header_from_other_round() {
        let k = key(1);
        let payload = Payload::from(BlockProposal::new(header(7)));
        let msg =
            ConsensusMessage::sign(ShardId(0), Round(3), ValidatorId(1), &payload, &k).unwrap();

        assert_eq!(
            msg.decode_payload(),
            Err(MessageError::RoundMismatch {
                envelope: Round(3),
                payload: Round(7),
            })
        );
    }

    #[test]
    fn test_decode_rejects_garbage_and_trailing_bytes() {
        let k = key(1);
        let payload = Payload::from(BlockProposal::new(header(3)));
        let mut msg =
            ConsensusMessage::sign(ShardId(0), Round(3), ValidatorId(1), &payload, &k).unwrap();

        msg.payload.push(0);
        assert_eq!(msg.decode_payload(), Err(MessageError::TrailingBytes(1)));

        msg.payload = vec![0xff; 4];
        assert!(matches!(msg.decode_payload(), Err(MessageError::Decode(_))));
    }

    #[test]
    fn test_envelope_bytes() {
        let k = key(1);
        let payload = Payload::from(BlockProposal::new(header(3)));
        let msg =
            ConsensusMessage::sign(ShardId(0), Round(3), ValidatorId(1), &payload, &k).unwrap();

        let bytes = msg.to_bytes().unwrap();
        assert_eq!(ConsensusMessage::from_bytes(&bytes).unwrap(), msg);
        assert!(ConsensusMessage::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }
}
