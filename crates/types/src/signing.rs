//! Domain-separated signing for cryptographic operations.
//!
//! Each signable message type has a unique domain tag prefix so a signature
//! produced in one context can never be replayed in another.
//!
//! | Tag | Purpose |
//! |-----|---------|
//! | `spos_header_sig:` | Partial signatures over a candidate header |
//! | `spos_message:` | Consensus message envelopes (signature over payload) |

use crate::{Epoch, Hash, Round, ShardId, SubroundId, ValidatorId};

/// Domain tag for partial signatures over a candidate header.
///
/// Format: `spos_header_sig:` || shard || epoch || round || header_hash
pub const DOMAIN_HEADER_SIGNATURE: &[u8] = b"spos_header_sig:";

/// Domain tag for consensus message envelopes.
///
/// Format: `spos_message:` || shard || round || subround || sender || payload_hash
pub const DOMAIN_CONSENSUS_MESSAGE: &[u8] = b"spos_message:";

/// Build the signing message for a partial header signature.
///
/// This is used for:
/// - Individual partial signatures in the Signature subround
/// - Aggregated signature verification of finalized headers
pub fn header_signature_message(
    shard: ShardId,
    epoch: Epoch,
    round: Round,
    header_hash: &Hash,
) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_HEADER_SIGNATURE.len() + 52);
    message.extend_from_slice(DOMAIN_HEADER_SIGNATURE);
    message.extend_from_slice(&shard.0.to_le_bytes());
    message.extend_from_slice(&epoch.0.to_le_bytes());
    message.extend_from_slice(&round.0.to_le_bytes());
    message.extend_from_slice(header_hash.as_bytes());
    message
}

/// Build the signing message for a consensus message envelope.
///
/// Binds the payload to its round, subround and sender so a valid payload
/// cannot be re-tagged by a relaying peer.
pub fn consensus_message_signing_bytes(
    shard: ShardId,
    round: Round,
    subround: SubroundId,
    sender: ValidatorId,
    payload: &[u8],
) -> Vec<u8> {
    let payload_hash = Hash::from_bytes(payload);
    let mut message = Vec::with_capacity(DOMAIN_CONSENSUS_MESSAGE.len() + 53);
    message.extend_from_slice(DOMAIN_CONSENSUS_MESSAGE);
    message.extend_from_slice(&shard.0.to_le_bytes());
    message.extend_from_slice(&round.0.to_le_bytes());
    message.push(subround.index() as u8);
    message.extend_from_slice(&sender.0.to_le_bytes());
    message.extend_from_slice(payload_hash.as_bytes());
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_signature_message_deterministic() {
        let header = Hash::from_bytes(b"header");

        let msg1 = header_signature_message(ShardId(1), Epoch(2), Round(10), &header);
        let msg2 = header_signature_message(ShardId(1), Epoch(2), Round(10), &header);

        assert_eq!(msg1, msg2);
        assert!(msg1.starts_with(DOMAIN_HEADER_SIGNATURE));
    }

    #[test]
    fn test_header_signature_message_binds_round_and_shard() {
        let header = Hash::from_bytes(b"header");
        let base = header_signature_message(ShardId(1), Epoch(0), Round(10), &header);

        assert_ne!(
            base,
            header_signature_message(ShardId(1), Epoch(0), Round(11), &header)
        );
        assert_ne!(
            base,
            header_signature_message(ShardId(2), Epoch(0), Round(10), &header)
        );
    }

    #[test]
    fn test_envelope_binds_subround_and_sender() {
        let payload = b"payload";
        let base = consensus_message_signing_bytes(
            ShardId(0),
            Round(3),
            SubroundId::Block,
            ValidatorId(1),
            payload,
        );

        assert!(base.starts_with(DOMAIN_CONSENSUS_MESSAGE));
        assert_ne!(
            base,
            consensus_message_signing_bytes(
                ShardId(0),
                Round(3),
                SubroundId::Signature,
                ValidatorId(1),
                payload
            )
        );
        assert_ne!(
            base,
            consensus_message_signing_bytes(
                ShardId(0),
                Round(3),
                SubroundId::Block,
                ValidatorId(2),
                payload
            )
        );
    }

    #[test]
    fn test_different_domains_produce_different_messages() {
        let hash = Hash::from_bytes(b"same");
        let header_msg = header_signature_message(ShardId(0), Epoch(0), Round(0), &hash);
        let envelope = consensus_message_signing_bytes(
            ShardId(0),
            Round(0),
            SubroundId::Start,
            ValidatorId(0),
            hash.as_bytes(),
        );
        assert_ne!(header_msg, envelope);
    }
}
