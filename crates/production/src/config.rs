//! Devnet configuration file.
//!
//! Example TOML:
//!
//! ```toml
//! [network]
//! shard = 0
//! round_duration_ms = 4000
//! genesis_delay_ms = 2000
//!
//! [consensus]
//! tick_interval_ms = 10
//! watchdog_timeout_ms = 30000
//! quorum_threshold = "super_majority"
//! leader_signs_proposal_from = 20
//!
//! [[validators]]
//! id = 0
//!
//! [[validators]]
//! id = 1
//! voting_power = 2
//! seed = "0101010101010101010101010101010101010101010101010101010101010101"
//!
//! [metrics]
//! dump_path = "./metrics.prom"
//! ```

use crate::network::RateLimitConfig;
use serde::Deserialize;
use spos_bft::{ConsensusConfig, EpochState, SubroundSchedule};
use spos_core::{ActivationRounds, ConfigError, ConsensusFlag};
use spos_types::{
    Epoch, Hash, KeyPair, QuorumThreshold, Round, ShardId, ValidatorId, ValidatorInfo,
    ValidatorSet,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DevnetConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Consensus(#[from] ConfigError),
}

/// Top-level devnet configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DevnetConfig {
    #[serde(default)]
    pub network: NetworkSection,

    #[serde(default)]
    pub consensus: ConsensusSection,

    /// Validators run by this process, in set order.
    pub validators: Vec<ValidatorEntry>,

    #[serde(default)]
    pub time_sync: TimeSyncSection,

    #[serde(default)]
    pub rate_limit: RateLimitSection,

    #[serde(default)]
    pub metrics: MetricsSection,
}

/// Shard, round clock and gossip bus.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSection {
    #[serde(default)]
    pub shard: u32,

    #[serde(default = "default_round_duration_ms")]
    pub round_duration_ms: u64,

    /// Genesis as Unix milliseconds. Takes precedence over `genesis_delay_ms`.
    #[serde(default)]
    pub genesis_unix_ms: Option<u64>,

    /// Genesis relative to process start.
    #[serde(default = "default_genesis_delay_ms")]
    pub genesis_delay_ms: u64,

    /// Leader shuffle seed (32 bytes hex). Derived from the shard when absent.
    #[serde(default)]
    pub epoch_seed: Option<String>,

    /// Frames buffered per endpoint of the in-memory bus.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_round_duration_ms() -> u64 {
    4_000
}

fn default_genesis_delay_ms() -> u64 {
    2_000
}

fn default_channel_capacity() -> usize {
    4_096
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            shard: 0,
            round_duration_ms: default_round_duration_ms(),
            genesis_unix_ms: None,
            genesis_delay_ms: default_genesis_delay_ms(),
            epoch_seed: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Scheduler settings. Unset fields keep [`ConsensusConfig::default`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsensusSection {
    pub tick_interval_ms: Option<u64>,
    pub watchdog_timeout_ms: Option<u64>,
    pub inbox_horizon: Option<u64>,
    pub inbox_capacity: Option<usize>,
    pub safety_margin_ms: Option<u64>,
    pub quorum_threshold: Option<QuorumThreshold>,
    pub schedule: Option<SubroundSchedule>,

    /// Round from which leaders attach their own signature to proposals.
    pub leader_signs_proposal_from: Option<u64>,
}

/// One validator of the devnet.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorEntry {
    pub id: u64,

    /// BLS secret seed (32 bytes hex). Derived from the id when absent.
    #[serde(default)]
    pub seed: Option<String>,

    #[serde(default = "default_voting_power")]
    pub voting_power: u64,
}

fn default_voting_power() -> u64 {
    1
}

/// Clock offset probing.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeSyncSection {
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// Offset reported by the fixed offset source.
    #[serde(default)]
    pub offset_nanos: i64,
}

fn default_refresh_interval_ms() -> u64 {
    60_000
}

impl Default for TimeSyncSection {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            offset_nanos: 0,
        }
    }
}

/// Inbound rate limits. Unset fields keep [`RateLimitConfig::default`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateLimitSection {
    pub validator_messages_per_sec: Option<u32>,
    pub validator_burst: Option<u32>,
    pub unverified_messages_per_sec: Option<u32>,
    pub unverified_burst: Option<u32>,
    pub sender_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsSection {
    /// Where to write the Prometheus text dump on shutdown.
    #[serde(default)]
    pub dump_path: Option<PathBuf>,
}

impl DevnetConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, DevnetConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| DevnetConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse and validate config text.
    pub fn parse(text: &str) -> Result<Self, DevnetConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that can be checked without a runtime.
    pub fn validate(&self) -> Result<(), DevnetConfigError> {
        if self.validators.is_empty() {
            return Err(ConfigError::EmptyValidatorSet.into());
        }
        if self.network.round_duration_ms == 0 {
            return Err(ConfigError::ZeroRoundDuration.into());
        }
        if self.network.channel_capacity == 0 {
            return Err(DevnetConfigError::Invalid(
                "channel capacity must be non-zero".into(),
            ));
        }
        if self.time_sync.refresh_interval_ms == 0 {
            return Err(DevnetConfigError::Invalid(
                "time sync refresh interval must be non-zero".into(),
            ));
        }
        self.consensus_config().validate()?;
        self.epoch_state()?;
        for entry in &self.validators {
            entry.key_pair()?;
        }
        Ok(())
    }

    pub fn shard(&self) -> ShardId {
        ShardId(self.network.shard)
    }

    pub fn round_duration(&self) -> Duration {
        Duration::from_millis(self.network.round_duration_ms)
    }

    /// Genesis as a duration since the Unix epoch, given the current time.
    pub fn genesis(&self, now: Duration) -> Duration {
        match self.network.genesis_unix_ms {
            Some(ms) => Duration::from_millis(ms),
            None => now + Duration::from_millis(self.network.genesis_delay_ms),
        }
    }

    pub fn consensus_config(&self) -> ConsensusConfig {
        let c = &self.consensus;
        let mut config = ConsensusConfig::default();
        if let Some(ms) = c.tick_interval_ms {
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = c.watchdog_timeout_ms {
            config.watchdog_timeout = Duration::from_millis(ms);
        }
        if let Some(horizon) = c.inbox_horizon {
            config.inbox_horizon = horizon;
        }
        if let Some(capacity) = c.inbox_capacity {
            config.inbox_capacity = capacity;
        }
        if let Some(ms) = c.safety_margin_ms {
            config.safety_margin = Duration::from_millis(ms);
        }
        if let Some(threshold) = c.quorum_threshold {
            config.quorum_threshold = threshold;
        }
        if let Some(schedule) = &c.schedule {
            config.schedule = schedule.clone();
        }
        config
    }

    pub fn activation_rounds(&self) -> ActivationRounds {
        match self.consensus.leader_signs_proposal_from {
            Some(round) => {
                ActivationRounds::none().with(ConsensusFlag::LeaderSignsProposal, Round(round))
            }
            None => ActivationRounds::none(),
        }
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        let r = &self.rate_limit;
        let d = RateLimitConfig::default();
        RateLimitConfig {
            validator_messages_per_sec: r
                .validator_messages_per_sec
                .unwrap_or(d.validator_messages_per_sec),
            validator_burst: r.validator_burst.unwrap_or(d.validator_burst),
            unverified_messages_per_sec: r
                .unverified_messages_per_sec
                .unwrap_or(d.unverified_messages_per_sec),
            unverified_burst: r.unverified_burst.unwrap_or(d.unverified_burst),
            sender_ttl: r
                .sender_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(d.sender_ttl),
        }
    }

    pub fn time_sync_interval(&self) -> Duration {
        Duration::from_millis(self.time_sync.refresh_interval_ms)
    }

    pub fn epoch_seed(&self) -> Result<Hash, DevnetConfigError> {
        match &self.network.epoch_seed {
            Some(text) => Ok(Hash::from_raw(decode_seed("epoch_seed", text)?)),
            None => Ok(Hash::from_parts(&[
                b"spos-devnet-epoch".as_slice(),
                &self.network.shard.to_le_bytes(),
            ])),
        }
    }

    /// The genesis epoch built from the validator list.
    pub fn epoch_state(&self) -> Result<EpochState, DevnetConfigError> {
        let mut infos = Vec::with_capacity(self.validators.len());
        for entry in &self.validators {
            infos.push(ValidatorInfo {
                validator_id: ValidatorId(entry.id),
                public_key: entry.key_pair()?.public_key(),
                voting_power: entry.voting_power,
            });
        }
        let set = ValidatorSet::new(infos).map_err(ConfigError::from)?;
        Ok(EpochState::new(
            Epoch(0),
            set,
            self.consensus_config().quorum_threshold,
            self.epoch_seed()?,
        )?)
    }
}

impl ValidatorEntry {
    pub fn validator_id(&self) -> ValidatorId {
        ValidatorId(self.id)
    }

    pub fn key_pair(&self) -> Result<KeyPair, DevnetConfigError> {
        let seed = match &self.seed {
            Some(text) => decode_seed("validator seed", text)?,
            None => Hash::from_parts(&[b"spos-devnet-key".as_slice(), &self.id.to_le_bytes()])
                .to_bytes(),
        };
        KeyPair::from_seed(&seed)
            .map_err(|e| DevnetConfigError::Invalid(format!("validator {}: {e}", self.id)))
    }
}

fn decode_seed(what: &str, text: &str) -> Result<[u8; 32], DevnetConfigError> {
    let bytes = hex::decode(text)
        .map_err(|e| DevnetConfigError::Invalid(format!("{what}: {e}")))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        DevnetConfigError::Invalid(format!("{what}: expected 32 bytes, got {}", b.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[[validators]]
id = 0

[[validators]]
id = 1
voting_power = 3
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = DevnetConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.shard(), ShardId(0));
        assert_eq!(config.round_duration(), Duration::from_millis(4_000));
        assert_eq!(
            config.consensus_config().tick_interval,
            ConsensusConfig::default().tick_interval
        );

        let epoch = config.epoch_state().unwrap();
        assert_eq!(epoch.validators().len(), 2);
        assert_eq!(epoch.total_voting_power(), 4);
    }

    #[test]
    fn test_overrides_applied() {
        let text = r#"
[network]
shard = 2
round_duration_ms = 1000
genesis_unix_ms = 5000

[consensus]
tick_interval_ms = 5
quorum_threshold = { weight = 2 }
leader_signs_proposal_from = 7

[rate_limit]
validator_burst = 9

[[validators]]
id = 0

[[validators]]
id = 1
"#;
        let config = DevnetConfig::parse(text).unwrap();
        assert_eq!(config.shard(), ShardId(2));
        assert_eq!(config.genesis(Duration::from_secs(100)), Duration::from_secs(5));

        let consensus = config.consensus_config();
        assert_eq!(consensus.tick_interval, Duration::from_millis(5));
        assert_eq!(consensus.quorum_threshold, QuorumThreshold::Weight(2));

        use spos_core::RoundGate;
        let gate = config.activation_rounds();
        assert!(!gate.is_enabled(ConsensusFlag::LeaderSignsProposal, Round(6)));
        assert!(gate.is_enabled(ConsensusFlag::LeaderSignsProposal, Round(7)));

        assert_eq!(config.rate_limit().validator_burst, 9);
    }

    #[test]
    fn test_genesis_delay_relative_to_now() {
        let config = DevnetConfig::parse(MINIMAL).unwrap();
        assert_eq!(
            config.genesis(Duration::from_secs(10)),
            Duration::from_secs(12)
        );
    }

    #[test]
    fn test_rejects_empty_validator_list() {
        let err = DevnetConfig::parse("validators = []").unwrap_err();
        assert!(matches!(
            err,
            DevnetConfigError::Consensus(ConfigError::EmptyValidatorSet)
        ));
    }

    #[test]
    fn test_rejects_unreachable_threshold() {
        let text = format!("[consensus]\nquorum_threshold = {{ weight = 10 }}\n{MINIMAL}");
        assert!(matches!(
            DevnetConfig::parse(&text),
            Err(DevnetConfigError::Consensus(ConfigError::InvalidThreshold(_)))
        ));
    }

    #[test]
    fn test_rejects_short_seed() {
        let text = "[[validators]]\nid = 0\nseed = \"abcd\"\n";
        assert!(matches!(
            DevnetConfig::parse(text),
            Err(DevnetConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_keys_are_deterministic() {
        let config = DevnetConfig::parse(MINIMAL).unwrap();
        let a = config.validators[0].key_pair().unwrap().public_key();
        let b = config.validators[0].key_pair().unwrap().public_key();
        let c = config.validators[1].key_pair().unwrap().public_key();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = DevnetConfig::load(file.path()).unwrap();
        assert_eq!(config.validators.len(), 2);

        assert!(matches!(
            DevnetConfig::load(Path::new("/nonexistent/devnet.toml")),
            Err(DevnetConfigError::Io { .. })
        ));
    }
}
