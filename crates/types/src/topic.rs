//! Consensus topic naming.

use crate::ShardId;

/// Fixed prefix of every consensus topic.
pub const CONSENSUS_TOPIC_PREFIX: &str = "consensus";

/// Shard-specific communication identifier appended to topic prefixes.
///
/// Regular shards map to `_<id>`, the metachain to `_META`.
pub fn communication_identifier(shard: ShardId) -> String {
    if shard.is_metachain() {
        "_META".to_string()
    } else {
        format!("_{}", shard.0)
    }
}

/// Topic on which a shard's validators exchange consensus messages.
pub fn consensus_topic(shard: ShardId) -> String {
    format!("{CONSENSUS_TOPIC_PREFIX}{}", communication_identifier(shard))
}
