//! Message encoding and decoding for network transport.
//!
//! # Wire Format
//!
//! Every consensus message is bincode-encoded then LZ4-compressed, with the
//! uncompressed length prepended:
//!
//! ```text
//! [u32 LE uncompressed length][LZ4 block]
//! ```
//!
//! # Topic-Based Dispatch
//!
//! Consensus messages of a shard share one topic. Frames on any other topic
//! are rejected before decompression.

use spos_core::OutboundMessage;
use spos_messages::{ConsensusMessage, MAX_PAYLOAD_BYTES};
use spos_types::{consensus_topic, ShardId};
use thiserror::Error;

/// Upper bound on a decompressed frame: the payload limit plus envelope overhead.
pub const MAX_FRAME_BYTES: usize = MAX_PAYLOAD_BYTES + 4 * 1024;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Message too short")]
    MessageTooShort,

    #[error("Frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Decompression error: {0}")]
    Decompress(String),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),
}

/// Encode an outbound message to wire format.
pub fn encode_message(message: &OutboundMessage) -> Result<Vec<u8>, CodecError> {
    let bytes = message
        .message()
        .to_bytes()
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(lz4_flex::compress_prepend_size(&bytes))
}

/// Decode a frame received on `topic` for `shard`.
pub fn decode_message(
    shard: ShardId,
    topic: &str,
    data: &[u8],
) -> Result<ConsensusMessage, CodecError> {
    if topic != consensus_topic(shard) {
        return Err(CodecError::UnknownTopic(topic.to_string()));
    }
    if data.len() < 4 {
        return Err(CodecError::MessageTooShort);
    }

    // Check the declared size before allocating for it.
    let declared = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if declared > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge {
            size: declared,
            max: MAX_FRAME_BYTES,
        });
    }

    let payload = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| CodecError::Decompress(e.to_string()))?;
    ConsensusMessage::from_bytes(&payload).map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spos_messages::{BlockProposal, PartialSignature, Payload};
    use spos_test_helpers::{sign_header, signed_message, test_header, validator_set};
    use spos_types::{Epoch, Round, ValidatorId};

    const SHARD: ShardId = ShardId(0);

    #[test]
    fn test_encode_decode_block_proposal() {
        let v = validator_set(2);
        let header = test_header(SHARD, Epoch(0), Round(3), ValidatorId(1));
        let message = signed_message(
            &v.keys[1],
            SHARD,
            Round(3),
            ValidatorId(1),
            BlockProposal::new(header.clone()),
        );
        let outbound = OutboundMessage::BlockProposal(message.clone());

        let bytes = encode_message(&outbound).unwrap();
        let decoded = decode_message(SHARD, &consensus_topic(SHARD), &bytes).unwrap();

        assert_eq!(decoded, message);
        assert!(decoded.verify(SHARD, &v.keys[1].public_key()));
        match decoded.decode_payload().unwrap() {
            Payload::BlockProposal(p) => assert_eq!(p.header, header),
            other => panic!("Expected BlockProposal, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_encode_decode_signature() {
        let v = validator_set(2);
        let header = test_header(SHARD, Epoch(0), Round(3), ValidatorId(1));
        let partial: PartialSignature = sign_header(&v.keys[0], SHARD, &header);
        let message = signed_message(&v.keys[0], SHARD, Round(3), ValidatorId(0), partial);

        let bytes = encode_message(&OutboundMessage::PartialSignature(message.clone())).unwrap();
        let decoded = decode_message(SHARD, &consensus_topic(SHARD), &bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_invalid_compressed_data() {
        let bytes = vec![8, 0, 0, 0, 99, 1, 2, 3];
        let result = decode_message(SHARD, &consensus_topic(SHARD), &bytes);
        assert!(matches!(result, Err(CodecError::Decompress(_))));
    }

    #[test]
    fn test_short_and_oversized_frames() {
        let topic = consensus_topic(SHARD);
        assert!(matches!(
            decode_message(SHARD, &topic, &[1, 2]),
            Err(CodecError::MessageTooShort)
        ));

        let mut huge = (u32::MAX).to_le_bytes().to_vec();
        huge.extend_from_slice(&[0; 16]);
        assert!(matches!(
            decode_message(SHARD, &topic, &huge),
            Err(CodecError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_unknown_topic() {
        let bytes = lz4_flex::compress_prepend_size(&[0u8; 8]);
        let result = decode_message(SHARD, &consensus_topic(ShardId(1)), &bytes);
        assert!(matches!(result, Err(CodecError::UnknownTopic(_))));
    }
}
