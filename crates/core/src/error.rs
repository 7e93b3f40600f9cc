//! Construction-time configuration errors.

use spos_types::{ThresholdError, ValidatorId, ValidatorSetError};
use thiserror::Error;

/// Errors that refuse to start the engine.
///
/// Every component validates its inputs when built; none of these can occur
/// once a component is running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing dependency: {0}")]
    MissingDependency(&'static str),

    #[error("round duration must be non-zero")]
    ZeroRoundDuration,

    #[error("invalid subround schedule: {0}")]
    InvalidSubroundSchedule(String),

    #[error("eligible validator set is empty")]
    EmptyValidatorSet,

    #[error("{0} has zero voting power")]
    ZeroVotingPower(ValidatorId),

    #[error("invalid quorum threshold: {0}")]
    InvalidThreshold(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ValidatorSetError> for ConfigError {
    fn from(err: ValidatorSetError) -> Self {
        match err {
            ValidatorSetError::Empty => ConfigError::EmptyValidatorSet,
            ValidatorSetError::ZeroVotingPower(id) => ConfigError::ZeroVotingPower(id),
            other => ConfigError::Invalid(other.to_string()),
        }
    }
}

impl From<ThresholdError> for ConfigError {
    fn from(err: ThresholdError) -> Self {
        ConfigError::InvalidThreshold(err.to_string())
    }
}
