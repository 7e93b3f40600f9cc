//! Consensus configuration.

use serde::{Deserialize, Serialize};
use spos_core::ConfigError;
use spos_types::{QuorumThreshold, SubroundId};
use std::time::Duration;

/// What happens to the round when a subround misses its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Jump to the End subround, which closes the round unfinalized.
    #[default]
    SkipToEnd,
    /// Abandon the round immediately; no further subround runs.
    AbortRound,
}

/// Time window of one subround, as fractions of the round duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubroundTiming {
    /// Offset at which the subround becomes active.
    pub start: f64,

    /// Offset by which the subround's check should have succeeded.
    pub end: f64,

    /// Whether checking continues past `end`.
    #[serde(default)]
    pub extendable: bool,

    /// Hard limit on the extension, as a fraction of the round.
    #[serde(default)]
    pub max_extension: f64,

    /// Policy applied when the (extended) deadline passes.
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

impl SubroundTiming {
    /// A window with no extension.
    pub fn fixed(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            extendable: false,
            max_extension: 0.0,
            on_failure: FailurePolicy::SkipToEnd,
        }
    }

    /// A window that keeps checking for up to `max_extension` past `end`.
    pub fn extendable(start: f64, end: f64, max_extension: f64) -> Self {
        Self {
            extendable: true,
            max_extension,
            ..Self::fixed(start, end)
        }
    }

    /// Set the failure policy.
    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    /// Last offset at which the check may still succeed. Never past round end.
    pub fn deadline(&self) -> f64 {
        if self.extendable {
            (self.end + self.max_extension).min(1.0)
        } else {
            self.end
        }
    }
}

/// Ordered subround windows covering `[0, 1)` of every round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubroundSchedule {
    pub start: SubroundTiming,
    pub block: SubroundTiming,
    pub signature: SubroundTiming,
    pub end: SubroundTiming,
}

impl Default for SubroundSchedule {
    fn default() -> Self {
        Self {
            start: SubroundTiming::fixed(0.0, 0.05),
            block: SubroundTiming::extendable(0.05, 0.50, 0.10),
            signature: SubroundTiming::extendable(0.50, 0.85, 0.10),
            end: SubroundTiming::fixed(0.85, 1.0),
        }
    }
}

impl SubroundSchedule {
    /// Window of a subround.
    pub fn timing(&self, id: SubroundId) -> &SubroundTiming {
        match id {
            SubroundId::Start => &self.start,
            SubroundId::Block => &self.block,
            SubroundId::Signature => &self.signature,
            SubroundId::End => &self.end,
        }
    }

    /// Subround whose window contains `fraction`.
    pub fn subround_at(&self, fraction: f64) -> SubroundId {
        SubroundId::ALL
            .into_iter()
            .rev()
            .find(|id| fraction >= self.timing(*id).start)
            .unwrap_or(SubroundId::Start)
    }

    /// Check the windows are ordered, contiguous and cover the whole round.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidSubroundSchedule(msg));

        let mut expected_start = 0.0;
        for id in SubroundId::ALL {
            let t = self.timing(id);
            if !(t.start.is_finite() && t.end.is_finite() && t.max_extension.is_finite()) {
                return invalid(format!("{id}: offsets must be finite"));
            }
            if t.start != expected_start {
                return invalid(format!(
                    "{id}: starts at {} but previous subround ends at {expected_start}",
                    t.start
                ));
            }
            if !(0.0 <= t.start && t.start < t.end && t.end <= 1.0) {
                return invalid(format!("{id}: window [{}, {}) out of range", t.start, t.end));
            }
            if t.max_extension < 0.0 {
                return invalid(format!("{id}: negative extension"));
            }
            expected_start = t.end;
        }

        if expected_start != 1.0 {
            return invalid(format!("schedule ends at {expected_start}, not 1.0"));
        }
        Ok(())
    }
}

/// Configuration for the round scheduler.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Interval between scheduler ticks. Should be far shorter than any subround.
    pub tick_interval: Duration,

    /// Stall after which the watchdog requests a resync.
    pub watchdog_timeout: Duration,

    /// How many rounds ahead of the current one inbound messages are buffered.
    pub inbox_horizon: u64,

    /// Maximum buffered messages per sender per round.
    pub inbox_capacity: usize,

    /// Time reserved before round end when bounding collaborator calls.
    pub safety_margin: Duration,

    /// Threshold used for epochs built from this configuration.
    pub quorum_threshold: QuorumThreshold,

    /// Subround windows.
    pub schedule: SubroundSchedule,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(10),
            watchdog_timeout: Duration::from_secs(30),
            inbox_horizon: 2,
            inbox_capacity: 8,
            safety_margin: Duration::from_millis(100),
            quorum_threshold: QuorumThreshold::SuperMajority,
            schedule: SubroundSchedule::default(),
        }
    }
}

impl ConsensusConfig {
    /// Validate every field; the scheduler refuses to start otherwise.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::Invalid("tick interval must be non-zero".into()));
        }
        if self.watchdog_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "watchdog timeout must be non-zero".into(),
            ));
        }
        if self.inbox_capacity == 0 {
            return Err(ConfigError::Invalid("inbox capacity must be non-zero".into()));
        }
        self.schedule.validate()
    }
}
