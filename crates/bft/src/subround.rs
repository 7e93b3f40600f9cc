//! The fixed subround pipeline: `Start → Block → Signature → End`.
//!
//! Every subround has the same three operations:
//!
//! - **job**: runs once when the subround becomes active
//! - **check**: polled every tick until it succeeds or the deadline passes
//! - **extend**: runs once when the subround enters its extension window
//!
//! Dispatch is a match on [`SubroundId`]; the pipeline is closed.

use crate::state::{ConsensusState, Role};
use spos_core::{Action, BlockAssembler, OutboundMessage, ProposalRequest};
use spos_messages::{
    BlockProposal, ConsensusMessage, FinalizedBlock, PartialSignature, Payload,
};
use spos_types::{header_signature_message, KeyPair, SubroundId};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a job did that the scheduler must account for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Done,
    Finalized(FinalizedBlock),
    Abandoned(&'static str),
}

/// Everything a subround operation may read or write.
pub(crate) struct SubroundContext<'a> {
    pub state: &'a mut ConsensusState,
    pub signing_key: &'a KeyPair,
    pub assembler: &'a dyn BlockAssembler,
    pub leader_signs_proposal: bool,
    /// Time left in the round before the safety margin.
    pub time_budget: Duration,
    pub actions: &'a mut Vec<Action>,
}

impl SubroundContext<'_> {
    fn broadcast(&mut self, payload: Payload, wrap: fn(ConsensusMessage) -> OutboundMessage) {
        let state = &*self.state;
        match ConsensusMessage::sign(
            state.shard(),
            state.round(),
            state.self_id(),
            &payload,
            self.signing_key,
        ) {
            Ok(message) => self.actions.push(Action::Broadcast {
                message: wrap(message),
            }),
            Err(e) => warn!(
                round = state.round().0,
                kind = payload.type_name(),
                error = %e,
                "Failed to sign consensus message"
            ),
        }
    }

    /// Sign the candidate header and record the signature as our own.
    fn sign_candidate(&mut self) -> Option<PartialSignature> {
        let state = &mut *self.state;
        let candidate = state.candidate()?;
        let message = header_signature_message(
            state.shard(),
            state.epoch().epoch(),
            state.round(),
            &candidate.hash,
        );
        let partial = PartialSignature::new(candidate.hash, self.signing_key.sign(&message));

        if let Err(e) = state.add_own_signature(partial.clone()) {
            warn!(round = state.round().0, error = %e, "Own signature rejected");
            return None;
        }
        Some(partial)
    }

    /// Ask the assembler for a header and broadcast it as the candidate.
    fn propose(&mut self) {
        let state = &mut *self.state;
        let request = ProposalRequest {
            shard: state.shard(),
            epoch: state.epoch().epoch(),
            round: state.round(),
            proposer: state.self_id(),
            timestamp_ms: state.round_start().as_millis() as u64,
            time_budget: self.time_budget,
        };
        let Some(header) = self.assembler.assemble(&request) else {
            debug!(round = request.round.0, "Block assembler returned no header");
            return;
        };
        let hash = header.hash();
        if let Err(e) = state.set_candidate(header.clone()) {
            warn!(round = request.round.0, error = %e, "Own proposal rejected");
            return;
        }

        let mut proposal = BlockProposal::new(header);
        if self.leader_signs_proposal {
            if let Some(partial) = self.sign_candidate() {
                proposal = proposal.with_leader_signature(partial.signature);
            }
        }
        self.broadcast(Payload::from(proposal), OutboundMessage::BlockProposal);
        info!(round = request.round.0, header = %hash, "Proposed block");
    }
}

/// The three-operation capability every subround implements.
pub(crate) trait Subround {
    fn job(self, ctx: &mut SubroundContext<'_>) -> JobOutcome;
    fn check(self, ctx: &SubroundContext<'_>) -> bool;
    fn extend(self, ctx: &mut SubroundContext<'_>);
}

impl Subround for SubroundId {
    fn job(self, ctx: &mut SubroundContext<'_>) -> JobOutcome {
        match self {
            SubroundId::Start => start_job(ctx),
            SubroundId::Block => block_job(ctx),
            SubroundId::Signature => signature_job(ctx),
            SubroundId::End => end_job(ctx),
        }
    }

    fn check(self, ctx: &SubroundContext<'_>) -> bool {
        match self {
            SubroundId::Start => true,
            SubroundId::Block => ctx.state.candidate().is_some(),
            SubroundId::Signature => ctx.state.has_quorum(),
            SubroundId::End => true,
        }
    }

    fn extend(self, ctx: &mut SubroundContext<'_>) {
        match self {
            SubroundId::Block => {
                if ctx.state.is_leader() && ctx.state.candidate().is_none() {
                    ctx.propose();
                }
            }
            SubroundId::Signature => {
                if let Some(partial) = ctx.state.own_signature().cloned() {
                    ctx.broadcast(Payload::from(partial), OutboundMessage::PartialSignature);
                }
            }
            SubroundId::Start | SubroundId::End => {}
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Jobs
// ═══════════════════════════════════════════════════════════════════════════

fn start_job(ctx: &mut SubroundContext<'_>) -> JobOutcome {
    let state = &*ctx.state;
    debug!(
        round = state.round().0,
        leader = state.leader().0,
        role = ?state.role(),
        "Round roles assigned"
    );
    JobOutcome::Done
}

fn block_job(ctx: &mut SubroundContext<'_>) -> JobOutcome {
    if ctx.state.is_leader() && ctx.state.candidate().is_none() {
        ctx.propose();
    }
    JobOutcome::Done
}

fn signature_job(ctx: &mut SubroundContext<'_>) -> JobOutcome {
    if ctx.state.role() == Role::Observer || ctx.state.own_signature().is_some() {
        return JobOutcome::Done;
    }
    if let Some(partial) = ctx.sign_candidate() {
        ctx.broadcast(Payload::from(partial), OutboundMessage::PartialSignature);
    }
    JobOutcome::Done
}

fn end_job(ctx: &mut SubroundContext<'_>) -> JobOutcome {
    let quorum_observed =
        ctx.state.subround_status(SubroundId::Signature) == crate::SubroundStatus::Completed;
    if !quorum_observed {
        let reason = if ctx.state.candidate().is_none() {
            "no candidate header"
        } else {
            "insufficient signatures"
        };
        ctx.state.abandon();
        return JobOutcome::Abandoned(reason);
    }

    match ctx.state.finalize() {
        Ok(block) => {
            ctx.actions.push(Action::CommitBlock {
                block: block.clone(),
            });
            if ctx.state.is_leader() {
                ctx.broadcast(
                    Payload::from(block.clone()),
                    OutboundMessage::FinalizedBlock,
                );
            }
            JobOutcome::Finalized(block)
        }
        Err(e) => {
            warn!(round = ctx.state.round().0, error = %e, "Failed to assemble finalized block");
            ctx.state.abandon();
            JobOutcome::Abandoned("aggregation failed")
        }
    }
}
