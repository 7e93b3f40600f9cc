//! SPOS round consensus.
//!
//! This crate provides the synchronous round scheduler and the subround state
//! machine it drives. It is shared by simulation and production.
//!
//! # Architecture
//!
//! Every round runs the fixed pipeline `Start → Block → Signature → End`:
//!
//! - `Start` → Determine leader and own role for the round
//! - `Block` → Leader proposes a header; others accept the leader's proposal
//! - `Signature` → Validators sign the candidate; check waits for quorum weight
//! - `End` → Aggregate, commit and broadcast, or abandon the round
//!
//! [`Chronology`] owns the per-round [`ConsensusState`] and is its only
//! mutator. Inbound messages reach it through the [`Worker`] inbox. All I/O is
//! performed by the runner via returned `Action`s.

mod aggregator;
mod chronology;
mod config;
mod epoch;
mod error;
mod flags;
mod state;
mod status;
mod subround;
mod worker;

pub use aggregator::{verify_finalized, AggregatedSignature, SignatureAggregator};
pub use chronology::{Chronology, ChronologyBuilder, ChronologyStats};
pub use config::{ConsensusConfig, FailurePolicy, SubroundSchedule, SubroundTiming};
pub use epoch::{EpochSnapshots, EpochState};
pub use error::{AggregationError, CandidateError, InboundError};
pub use flags::RoundGatedFlag;
pub use state::{Candidate, ConsensusState, Role, SubroundStatus};
pub use status::StatusReporter;
pub use worker::{AuthenticatedMessage, InboundMessage, Worker};
