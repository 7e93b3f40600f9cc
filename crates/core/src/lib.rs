//! Core types for the SPOS consensus architecture.
//!
//! This crate defines the seams between the synchronous consensus core and
//! everything around it:
//!
//! - [`Action`]: outputs of the round scheduler, performed by the runner
//! - [`OutboundMessage`]: consensus messages to broadcast
//! - [`StatusUpdate`] and [`StatusSink`]: fire-and-forget status reporting
//! - Collaborator traits ([`TimeSource`], [`BlockAssembler`], [`BlockCommitter`],
//!   [`ResyncTrigger`], [`RoundGate`])
//! - [`ConfigError`]: construction-time failures shared by all components

mod action;
mod error;
mod message;
mod request;
mod status;
mod traits;

pub use action::Action;
pub use error::ConfigError;
pub use message::OutboundMessage;
pub use request::ResyncRequest;
pub use status::{keys, ConsensusOutcome, NoopStatusSink, StatusSink, StatusUpdate};
pub use traits::{
    ActivationRounds, BlockAssembler, BlockCommitter, ConsensusFlag, ProposalRequest,
    ResyncTrigger, RoundGate, TimeSource,
};
