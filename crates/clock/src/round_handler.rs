//! Mapping from time to round index.
//!
//! A round is never stored: its index is always recomputed from
//! `(now - genesis) / duration`. Every validator with agreeing clocks derives
//! the same index at the same instant.

use spos_core::{ConfigError, TimeSource};
use spos_types::Round;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors computing round positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RoundError {
    #[error("time {now:?} is before genesis {genesis:?}")]
    BeforeGenesis { now: Duration, genesis: Duration },
}

/// Pure computation of round index and phase from time.
pub struct RoundHandler {
    genesis: Duration,
    duration: Duration,
    time_source: Arc<dyn TimeSource>,
}

impl std::fmt::Debug for RoundHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundHandler")
            .field("genesis", &self.genesis)
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RoundHandler`]. Every argument is required.
#[derive(Default)]
pub struct RoundHandlerBuilder {
    genesis: Option<Duration>,
    duration: Option<Duration>,
    time_source: Option<Arc<dyn TimeSource>>,
}

impl RoundHandlerBuilder {
    /// Genesis time, as a duration since the Unix epoch.
    pub fn genesis(mut self, genesis: Duration) -> Self {
        self.genesis = Some(genesis);
        self
    }

    /// Fixed round duration.
    pub fn round_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Time source consulted by [`RoundHandler::current_index`].
    pub fn time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = Some(time_source);
        self
    }

    /// Build the handler, naming the first missing argument on failure.
    pub fn build(self) -> Result<RoundHandler, ConfigError> {
        let genesis = self
            .genesis
            .ok_or(ConfigError::MissingDependency("genesis time"))?;
        let time_source = self
            .time_source
            .ok_or(ConfigError::MissingDependency("time source"))?;
        let duration = self
            .duration
            .ok_or(ConfigError::MissingDependency("round duration"))?;
        if duration.is_zero() {
            return Err(ConfigError::ZeroRoundDuration);
        }

        Ok(RoundHandler {
            genesis,
            duration,
            time_source,
        })
    }
}

impl RoundHandler {
    /// Start building a handler.
    pub fn builder() -> RoundHandlerBuilder {
        RoundHandlerBuilder::default()
    }

    /// Genesis time.
    pub fn genesis(&self) -> Duration {
        self.genesis
    }

    /// Current time according to the configured time source.
    pub fn now(&self) -> Duration {
        self.time_source.now()
    }

    /// Round index at `now`.
    pub fn index(&self, now: Duration) -> Result<Round, RoundError> {
        let elapsed = self.elapsed(now)?;
        Ok(Round((elapsed.as_nanos() / self.duration.as_nanos()) as u64))
    }

    /// Round index at the time source's current time.
    pub fn current_index(&self) -> Result<Round, RoundError> {
        self.index(self.now())
    }

    /// Start time of `round`.
    pub fn time_stamp(&self, round: Round) -> Duration {
        let offset = self.duration.as_nanos().saturating_mul(round.0 as u128);
        self.genesis.saturating_add(nanos_to_duration(offset))
    }

    /// Fixed round duration.
    pub fn time_duration(&self) -> Duration {
        self.duration
    }

    /// Time already spent in the round containing `now`.
    pub fn offset_in_round(&self, now: Duration) -> Result<Duration, RoundError> {
        let elapsed = self.elapsed(now)?;
        Ok(nanos_to_duration(
            elapsed.as_nanos() % self.duration.as_nanos(),
        ))
    }

    /// Fraction of the round containing `now` that has elapsed, in `[0, 1)`.
    pub fn round_fraction(&self, now: Duration) -> Result<f64, RoundError> {
        let offset = self.offset_in_round(now)?;
        Ok(offset.as_secs_f64() / self.duration.as_secs_f64())
    }

    /// Time left in the round containing `now`, minus `safety_margin`.
    ///
    /// Before genesis the remaining time runs to the end of the first round.
    pub fn remaining_time(&self, now: Duration, safety_margin: Duration) -> Duration {
        let round = self.index(now).unwrap_or(Round::GENESIS);
        self.time_stamp(round.next())
            .saturating_sub(now)
            .saturating_sub(safety_margin)
    }

    fn elapsed(&self, now: Duration) -> Result<Duration, RoundError> {
        now.checked_sub(self.genesis)
            .ok_or(RoundError::BeforeGenesis {
                now,
                genesis: self.genesis,
            })
    }
}

fn nanos_to_duration(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    let secs = nanos / NANOS_PER_SEC;
    if secs > u64::MAX as u128 {
        return Duration::MAX;
    }
    Duration::new(secs as u64, (nanos % NANOS_PER_SEC) as u32)
}
