//! The round scheduler.
//!
//! [`Chronology::tick`] is called periodically by the runner. Each tick:
//!
//! 1. Reads the round index and in-round fraction from the [`RoundHandler`]
//! 2. On a new round, tears down the previous [`ConsensusState`], builds a
//!    fresh one and re-arms the watchdog
//! 3. Drains the worker inbox for the current round into the state
//! 4. Drives the subround cursor: job once, check until success or deadline
//!
//! The scheduler is the only mutator of consensus state. Everything it needs
//! the outside world to do comes back as [`Action`]s.

use crate::aggregator::verify_finalized;
use crate::error::{AggregationError, CandidateError};
use crate::state::{ConsensusState, SubroundStatus};
use crate::subround::{JobOutcome, Subround, SubroundContext};
use crate::{ConsensusConfig, EpochSnapshots, FailurePolicy, RoundGatedFlag, StatusReporter, Worker};
use spos_clock::{RoundHandler, Watchdog};
use spos_core::{
    Action, BlockAssembler, ConfigError, ConsensusFlag, ConsensusOutcome, ResyncRequest,
    RoundGate, StatusSink, StatusUpdate,
};
use spos_messages::{BlockProposal, FinalizedBlock, PartialSignature, Payload};
use spos_types::{KeyPair, Round, ShardId, SubroundId, ValidatorId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Round outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChronologyStats {
    pub rounds_started: u64,
    pub rounds_finalized: u64,
    pub rounds_abandoned: u64,
    pub subround_failures: u64,
    pub messages_dropped: u64,
    pub resync_requests: u64,
}

// ═══════════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════════

/// Builder for [`Chronology`].
///
/// Every collaborator is required. Use [`DisabledWatchdog`](spos_clock::DisabledWatchdog)
/// or [`NoopStatusSink`](spos_core::NoopStatusSink) to opt out explicitly.
#[derive(Default)]
pub struct ChronologyBuilder {
    config: Option<ConsensusConfig>,
    shard: Option<ShardId>,
    self_id: Option<ValidatorId>,
    signing_key: Option<Arc<KeyPair>>,
    round_handler: Option<RoundHandler>,
    watchdog: Option<Arc<dyn Watchdog>>,
    status_sink: Option<Arc<dyn StatusSink>>,
    epochs: Option<Arc<EpochSnapshots>>,
    assembler: Option<Arc<dyn BlockAssembler>>,
    round_gate: Option<Arc<dyn RoundGate>>,
}

impl ChronologyBuilder {
    /// Scheduler configuration. Defaults to [`ConsensusConfig::default`].
    pub fn config(mut self, config: ConsensusConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn shard(mut self, shard: ShardId) -> Self {
        self.shard = Some(shard);
        self
    }

    /// Identity and signing key of this node.
    pub fn identity(mut self, self_id: ValidatorId, signing_key: Arc<KeyPair>) -> Self {
        self.self_id = Some(self_id);
        self.signing_key = Some(signing_key);
        self
    }

    pub fn round_handler(mut self, round_handler: RoundHandler) -> Self {
        self.round_handler = Some(round_handler);
        self
    }

    pub fn watchdog(mut self, watchdog: Arc<dyn Watchdog>) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    pub fn status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status_sink = Some(sink);
        self
    }

    pub fn epochs(mut self, epochs: Arc<EpochSnapshots>) -> Self {
        self.epochs = Some(epochs);
        self
    }

    pub fn block_assembler(mut self, assembler: Arc<dyn BlockAssembler>) -> Self {
        self.assembler = Some(assembler);
        self
    }

    pub fn round_gate(mut self, gate: Arc<dyn RoundGate>) -> Self {
        self.round_gate = Some(gate);
        self
    }

    /// Validate the configuration and build the scheduler.
    pub fn build(self) -> Result<Chronology, ConfigError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let shard = self.shard.ok_or(ConfigError::MissingDependency("shard"))?;
        let self_id = self
            .self_id
            .ok_or(ConfigError::MissingDependency("validator identity"))?;
        let signing_key = self
            .signing_key
            .ok_or(ConfigError::MissingDependency("signing key"))?;
        let round_handler = self
            .round_handler
            .ok_or(ConfigError::MissingDependency("round handler"))?;
        let watchdog = self
            .watchdog
            .ok_or(ConfigError::MissingDependency("watchdog"))?;
        let status_sink = self
            .status_sink
            .ok_or(ConfigError::MissingDependency("status sink"))?;
        let epochs = self
            .epochs
            .ok_or(ConfigError::MissingDependency("epoch snapshots"))?;
        let assembler = self
            .assembler
            .ok_or(ConfigError::MissingDependency("block assembler"))?;
        let round_gate = self
            .round_gate
            .ok_or(ConfigError::MissingDependency("round gate"))?;

        let worker = Arc::new(Worker::new(shard, self_id, epochs.clone(), &config));

        Ok(Chronology {
            config,
            shard,
            self_id,
            signing_key,
            round_handler,
            watchdog,
            reporter: StatusReporter::new(status_sink),
            worker,
            epochs,
            assembler,
            round_gate,
            leader_signs_proposal: RoundGatedFlag::new(ConsensusFlag::LeaderSignsProposal),
            state: None,
            cursor: SubroundId::Start,
            stats: ChronologyStats::default(),
            stopped: false,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Scheduler
// ═══════════════════════════════════════════════════════════════════════════

/// Drives one node through the round/subround pipeline.
pub struct Chronology {
    config: ConsensusConfig,
    shard: ShardId,
    self_id: ValidatorId,
    signing_key: Arc<KeyPair>,
    round_handler: RoundHandler,
    watchdog: Arc<dyn Watchdog>,
    reporter: StatusReporter,
    worker: Arc<Worker>,
    epochs: Arc<EpochSnapshots>,
    assembler: Arc<dyn BlockAssembler>,
    round_gate: Arc<dyn RoundGate>,
    leader_signs_proposal: RoundGatedFlag,

    state: Option<ConsensusState>,
    cursor: SubroundId,
    stats: ChronologyStats,
    stopped: bool,
}

impl std::fmt::Debug for Chronology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chronology")
            .field("shard", &self.shard)
            .field("self_id", &self.self_id)
            .field("round", &self.current_round())
            .field("cursor", &self.cursor)
            .field("stats", &self.stats)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl Chronology {
    pub fn builder() -> ChronologyBuilder {
        ChronologyBuilder::default()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    pub fn self_id(&self) -> ValidatorId {
        self.self_id
    }

    /// Inbound message intake, shared with the network-receive path.
    pub fn worker(&self) -> Arc<Worker> {
        self.worker.clone()
    }

    pub fn epochs(&self) -> Arc<EpochSnapshots> {
        self.epochs.clone()
    }

    pub fn round_handler(&self) -> &RoundHandler {
        &self.round_handler
    }

    /// State of the round in progress, if any round has started.
    pub fn state(&self) -> Option<&ConsensusState> {
        self.state.as_ref()
    }

    pub fn current_round(&self) -> Option<Round> {
        self.state.as_ref().map(ConsensusState::round)
    }

    /// Subround the cursor points at.
    pub fn cursor(&self) -> SubroundId {
        self.cursor
    }

    pub fn stats(&self) -> ChronologyStats {
        self.stats
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn leader_signs_proposal(&self) -> bool {
        self.leader_signs_proposal.is_enabled()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Control
    // ═══════════════════════════════════════════════════════════════════════

    /// Run one scheduler step at the round handler's current time.
    pub fn tick(&mut self) -> Vec<Action> {
        let now = self.round_handler.now();
        self.tick_at(now)
    }

    /// Run one scheduler step at `now`.
    pub fn tick_at(&mut self, now: Duration) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.stopped {
            return actions;
        }

        let (round, fraction) = match (
            self.round_handler.index(now),
            self.round_handler.round_fraction(now),
        ) {
            (Ok(round), Ok(fraction)) => (round, fraction),
            (Err(e), _) | (_, Err(e)) => {
                trace!(error = %e, "Tick before genesis");
                return actions;
            }
        };

        let time_budget = self
            .round_handler
            .remaining_time(now, self.config.safety_margin);
        if self.current_round().map_or(true, |current| round > current) {
            self.start_round(round);
        } else {
            // Settle deadlines that passed since the last tick on what had
            // arrived by then. Messages drained below only count toward
            // windows that are still open.
            self.drive(fraction, time_budget, &mut actions);
        }

        self.ingest();
        self.drive(fraction, time_budget, &mut actions);
        actions
    }

    /// Stop the scheduler. In-flight work is abandoned; nothing more is emitted.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.watchdog.disarm();
        if let Some(state) = self.state.as_mut() {
            state.abandon();
        }
        info!(round = ?self.current_round().map(|r| r.0), "Chronology stopped");
    }

    /// Record that the watchdog fired and recovery was requested.
    pub fn on_resync_requested(&mut self, request: &ResyncRequest) {
        self.stats.resync_requests += 1;
        self.reporter.report(&StatusUpdate::ResyncRequested {
            round: request.round,
        });
        warn!(
            round = request.round.0,
            stalled_for = ?request.stalled_for,
            "Resync requested"
        );
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Round lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    fn start_round(&mut self, round: Round) {
        if let Some(mut previous) = self.state.take() {
            if previous.outcome() == ConsensusOutcome::InProgress {
                previous.abandon();
                self.stats.rounds_abandoned += 1;
                self.reporter.report(&StatusUpdate::RoundAbandoned {
                    round: previous.round(),
                    reason: "round elapsed",
                });
                info!(round = previous.round().0, "Round elapsed unfinalized");
            }
        }

        self.worker.advance_to(round);
        let epoch = self.epochs.load();
        if self
            .leader_signs_proposal
            .refresh(self.round_gate.as_ref(), round)
        {
            info!(
                round = round.0,
                flag = ?self.leader_signs_proposal.flag(),
                enabled = self.leader_signs_proposal.is_enabled(),
                "Round-gated flag changed"
            );
        }

        let state = ConsensusState::new(
            round,
            self.round_handler.time_stamp(round),
            self.shard,
            epoch.clone(),
            self.self_id,
        );
        self.watchdog.arm(
            self.config.watchdog_timeout,
            ResyncRequest {
                round,
                stalled_for: self.config.watchdog_timeout,
            },
        );

        self.stats.rounds_started += 1;
        self.reporter.report(&StatusUpdate::RoundStarted {
            round,
            epoch: epoch.epoch(),
            leader: state.leader(),
            is_leader: state.is_leader(),
        });
        info!(
            round = round.0,
            epoch = epoch.epoch().0,
            leader = state.leader().0,
            role = ?state.role(),
            "Round started"
        );

        self.state = Some(state);
        self.cursor = SubroundId::Start;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Inbound messages
    // ═══════════════════════════════════════════════════════════════════════

    fn ingest(&mut self) {
        for (reason, count) in self.worker.take_dropped() {
            self.record_drops(reason, count);
        }

        let Some(round) = self.current_round() else {
            return;
        };
        for message in self.worker.drain(round) {
            let sender = message.sender;
            let result = match message.payload {
                Payload::BlockProposal(proposal) => self.on_block_proposal(sender, proposal),
                Payload::PartialSignature(partial) => self.on_partial_signature(sender, partial),
                Payload::FinalizedBlock(block) => self.on_finalized_block(sender, block),
            };
            if let Err(reason) = result {
                self.record_drops(reason, 1);
            }
        }
    }

    fn record_drops(&mut self, reason: &'static str, count: u64) {
        let round = self.current_round().unwrap_or_default();
        self.stats.messages_dropped += count;
        for _ in 0..count {
            self.reporter
                .report(&StatusUpdate::MessageDropped { round, reason });
        }
    }

    fn on_block_proposal(
        &mut self,
        sender: ValidatorId,
        proposal: BlockProposal,
    ) -> Result<(), &'static str> {
        let leader_signs = self.leader_signs_proposal.is_enabled();
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        if sender != state.leader() {
            warn!(round = state.round().0, sender = sender.0, "Proposal from non-leader");
            return Err("not_leader");
        }

        let header = &proposal.header;
        if header.round != state.round()
            || header.shard != state.shard()
            || header.proposer != sender
            || header.epoch != state.epoch().epoch()
        {
            warn!(
                round = state.round().0,
                header_round = header.round.0,
                proposer = header.proposer.0,
                "Proposal header does not match the round"
            );
            return Err("invalid_header");
        }
        if !self.assembler.validate(header) {
            warn!(round = state.round().0, "Proposal header failed validation");
            return Err("invalid_header");
        }

        let hash = proposal.header_hash();
        match state.set_candidate(proposal.header) {
            Ok(true) => debug!(round = state.round().0, header = %hash, "Accepted leader proposal"),
            Ok(false) => trace!(round = state.round().0, "Duplicate proposal"),
            Err(CandidateError::Conflicting { existing, offered }) => {
                warn!(
                    round = state.round().0,
                    %existing,
                    %offered,
                    "Conflicting proposal rejected"
                );
                return Err("conflicting_candidate");
            }
            Err(CandidateError::Finalized) => return Err("round_finalized"),
        }

        match proposal.leader_signature {
            Some(signature) if leader_signs => {
                let partial = PartialSignature::new(hash, signature);
                if let Err(e) = state.add_signature(sender, partial) {
                    return Err(aggregation_reason(&e));
                }
            }
            Some(_) => trace!(round = state.round().0, "Ignoring leader signature on proposal"),
            None => {}
        }
        Ok(())
    }

    fn on_partial_signature(
        &mut self,
        sender: ValidatorId,
        partial: PartialSignature,
    ) -> Result<(), &'static str> {
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        match state.add_signature(sender, partial) {
            Ok(()) => {
                trace!(
                    round = state.round().0,
                    signer = sender.0,
                    weight = state.signed_weight(),
                    "Signature recorded"
                );
                Ok(())
            }
            // Late signatures after finalization are expected.
            Err(AggregationError::Finalized) => Ok(()),
            Err(AggregationError::DuplicateSigner(_)) => {
                trace!(round = state.round().0, signer = sender.0, "Duplicate signature");
                Err("duplicate_signer")
            }
            Err(e) => {
                warn!(round = state.round().0, signer = sender.0, error = %e, "Signature rejected");
                Err(aggregation_reason(&e))
            }
        }
    }

    fn on_finalized_block(
        &mut self,
        sender: ValidatorId,
        block: FinalizedBlock,
    ) -> Result<(), &'static str> {
        let shard = self.shard;
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        if state.is_finalized() {
            return Ok(());
        }
        if sender != state.leader() {
            warn!(round = state.round().0, sender = sender.0, "Finalized block from non-leader");
            return Err("not_leader");
        }
        if block.header.round != state.round() {
            return Err("invalid_header");
        }
        if let Err(e) = verify_finalized(state.epoch(), shard, &block) {
            warn!(round = state.round().0, error = %e, "Finalized block rejected");
            return Err(aggregation_reason(&e));
        }
        match state.accept_leader_evidence(block) {
            Ok(()) => {
                debug!(round = state.round().0, "Accepted leader's finalized block");
                Ok(())
            }
            Err(e) => {
                warn!(round = state.round().0, error = %e, "Finalized block conflicts with candidate");
                Err("conflicting_candidate")
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Subround driving
    // ═══════════════════════════════════════════════════════════════════════

    fn drive(&mut self, fraction: f64, time_budget: Duration, actions: &mut Vec<Action>) {
        let Self {
            config,
            signing_key,
            assembler,
            reporter,
            leader_signs_proposal,
            state,
            cursor,
            stats,
            ..
        } = self;
        let Some(state) = state.as_mut() else {
            return;
        };
        let round = state.round();

        loop {
            let id = *cursor;
            let timing = *config.schedule.timing(id);
            let status = state.subround_status(id);

            if matches!(status, SubroundStatus::Completed | SubroundStatus::Failed) {
                match id.next() {
                    Some(next) => {
                        *cursor = next;
                        continue;
                    }
                    None => return,
                }
            }
            if fraction < timing.start {
                return;
            }

            let mut ctx = SubroundContext {
                state: &mut *state,
                signing_key: signing_key.as_ref(),
                assembler: assembler.as_ref(),
                leader_signs_proposal: leader_signs_proposal.is_enabled(),
                time_budget,
                actions: &mut *actions,
            };

            if status == SubroundStatus::Pending {
                ctx.state.set_subround_status(id, SubroundStatus::Running);
                reporter.report(&StatusUpdate::SubroundEntered { round, subround: id });
                let window = config.schedule.subround_at(fraction);
                if window == id {
                    trace!(round = round.0, subround = ?id, fraction, "Subround entered");
                } else {
                    debug!(
                        round = round.0,
                        subround = ?id,
                        window = ?window,
                        fraction,
                        "Subround entered behind schedule"
                    );
                }

                match id.job(&mut ctx) {
                    JobOutcome::Done => {}
                    JobOutcome::Finalized(block) => {
                        stats.rounds_finalized += 1;
                        reporter.report(&StatusUpdate::RoundFinalized {
                            round,
                            header_hash: block.header.hash(),
                            signers: block.signers.count(),
                            voting_power: block.voting_power,
                        });
                        info!(
                            round = round.0,
                            header = %block.header.hash(),
                            signers = block.signers.count(),
                            voting_power = block.voting_power,
                            "Round finalized"
                        );
                    }
                    JobOutcome::Abandoned(reason) => {
                        stats.rounds_abandoned += 1;
                        reporter.report(&StatusUpdate::RoundAbandoned { round, reason });
                        info!(round = round.0, reason, "Round abandoned");
                    }
                }
            }

            if id.check(&ctx) {
                ctx.state.set_subround_status(id, SubroundStatus::Completed);
                trace!(round = round.0, subround = ?id, "Subround completed");
                continue;
            }

            if fraction >= timing.deadline() {
                ctx.state.set_subround_status(id, SubroundStatus::Failed);
                stats.subround_failures += 1;
                reporter.report(&StatusUpdate::SubroundFailed { round, subround: id });
                warn!(
                    round = round.0,
                    subround = ?id,
                    fraction,
                    policy = ?timing.on_failure,
                    "Subround missed its deadline"
                );

                match timing.on_failure {
                    FailurePolicy::SkipToEnd => *cursor = SubroundId::End,
                    FailurePolicy::AbortRound => {
                        state.abandon();
                        state.set_subround_status(SubroundId::End, SubroundStatus::Completed);
                        *cursor = SubroundId::End;
                        stats.rounds_abandoned += 1;
                        reporter.report(&StatusUpdate::RoundAbandoned {
                            round,
                            reason: "subround failed",
                        });
                        info!(round = round.0, subround = ?id, "Round aborted");
                    }
                }
                continue;
            }

            if timing.extendable && fraction >= timing.end && status != SubroundStatus::Extended {
                ctx.state.set_subround_status(id, SubroundStatus::Extended);
                debug!(round = round.0, subround = ?id, fraction, "Subround extended");
                id.extend(&mut ctx);
                if id.check(&ctx) {
                    ctx.state.set_subround_status(id, SubroundStatus::Completed);
                    continue;
                }
            }
            return;
        }
    }
}

fn aggregation_reason(error: &AggregationError) -> &'static str {
    match error {
        AggregationError::DuplicateSigner(_) => "duplicate_signer",
        AggregationError::UnknownSigner(_) => "unknown_signer",
        AggregationError::InvalidSignature(_) | AggregationError::Crypto(_) => "invalid_signature",
        AggregationError::InsufficientSignatures { .. } => "insufficient_signatures",
        AggregationError::InvalidAggregate(_) => "invalid_aggregate",
        AggregationError::Finalized => "round_finalized",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EpochState;
    use spos_clock::{ManualClock, ManualWatchdog};
    use spos_core::{ActivationRounds, NoopStatusSink, OutboundMessage};
    use spos_test_helpers::{
        sign_header, signed_message, test_header, validator_set, TestAssembler, TestValidators,
    };
    use spos_types::{BlockHeader, Epoch, Hash, QuorumThreshold};
    use tracing_test::traced_test;

    const SHARD: ShardId = ShardId(0);
    const GENESIS: Duration = Duration::from_secs(1_000);
    const ROUND: Duration = Duration::from_secs(5);

    struct Harness {
        validators: TestValidators,
        clock: ManualClock,
        watchdog: Arc<ManualWatchdog>,
        chronology: Chronology,
    }

    impl Harness {
        /// Move the clock to `fraction` of `round` and tick.
        fn tick(&mut self, round: u64, fraction: f64) -> Vec<Action> {
            let offset = ROUND.mul_f64(fraction);
            self.clock.set(GENESIS + ROUND * round as u32 + offset);
            self.chronology.tick()
        }

        fn leader(&self, round: u64) -> ValidatorId {
            self.chronology.epochs().load().leader_for(Round(round))
        }

        fn deliver(&self, sender: ValidatorId, round: u64, payload: impl Into<Payload>) {
            let message = signed_message(
                self.validators.key(sender),
                SHARD,
                Round(round),
                sender,
                payload,
            );
            self.chronology.worker().receive(message).unwrap();
        }
    }

    fn epoch_state(validators: &TestValidators) -> EpochState {
        EpochState::new(
            Epoch(0),
            validators.set.clone(),
            QuorumThreshold::SuperMajority,
            Hash::from_bytes(b"seed"),
        )
        .unwrap()
    }

    fn builder_for(
        validators: &TestValidators,
        self_id: ValidatorId,
        clock: &ManualClock,
    ) -> (ChronologyBuilder, Arc<ManualWatchdog>) {
        let watchdog = Arc::new(ManualWatchdog::new(Arc::new(clock.clone())));
        let round_handler = RoundHandler::builder()
            .genesis(GENESIS)
            .round_duration(ROUND)
            .time_source(Arc::new(clock.clone()))
            .build()
            .unwrap();
        let key = validators
            .set
            .index_of(self_id)
            .map(|i| validators.keys[i].clone())
            .unwrap_or_else(|| spos_test_helpers::deterministic_key(self_id.0));

        let builder = Chronology::builder()
            .shard(SHARD)
            .identity(self_id, Arc::new(key))
            .round_handler(round_handler)
            .watchdog(watchdog.clone())
            .status_sink(Arc::new(NoopStatusSink))
            .epochs(Arc::new(EpochSnapshots::new(epoch_state(validators))))
            .block_assembler(Arc::new(TestAssembler::new()))
            .round_gate(Arc::new(ActivationRounds::none()));
        (builder, watchdog)
    }

    fn harness_with(
        n: usize,
        pick: impl FnOnce(&EpochState) -> ValidatorId,
        customize: impl FnOnce(ChronologyBuilder) -> ChronologyBuilder,
    ) -> Harness {
        let validators = validator_set(n);
        let self_id = pick(&epoch_state(&validators));
        let clock = ManualClock::new(GENESIS);
        let (builder, watchdog) = builder_for(&validators, self_id, &clock);
        Harness {
            chronology: customize(builder).build().unwrap(),
            validators,
            clock,
            watchdog,
        }
    }

    /// Node that is not the leader of round 0.
    fn validator_harness() -> Harness {
        harness_with(
            4,
            |epoch| {
                let leader = epoch.leader_for(Round(0));
                ValidatorId((leader.0 + 1) % 4)
            },
            |b| b,
        )
    }

    fn commits(actions: &[Action]) -> Vec<&FinalizedBlock> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::CommitBlock { block } => Some(block),
                _ => None,
            })
            .collect()
    }

    fn broadcasts(actions: &[Action]) -> Vec<&OutboundMessage> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Broadcast { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_builder_requires_every_dependency() {
        let validators = validator_set(1);
        let clock = ManualClock::new(GENESIS);
        let (builder, _) = builder_for(&validators, ValidatorId(0), &clock);
        assert!(builder.build().is_ok());

        let err = Chronology::builder()
            .shard(SHARD)
            .identity(ValidatorId(0), Arc::new(validators.keys[0].clone()))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingDependency("round handler"));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let validators = validator_set(1);
        let clock = ManualClock::new(GENESIS);
        let (builder, _) = builder_for(&validators, ValidatorId(0), &clock);
        let mut config = ConsensusConfig::default();
        config.schedule.block.end = 0.3;

        assert!(matches!(
            builder.config(config).build(),
            Err(ConfigError::InvalidSubroundSchedule(_))
        ));
    }

    #[traced_test]
    #[test]
    fn test_single_validator_finalizes() {
        let mut h = harness_with(1, |_| ValidatorId(0), |b| b);

        let actions = h.tick(0, 0.1);
        assert_eq!(h.chronology.current_round(), Some(Round(0)));
        assert!(matches!(
            broadcasts(&actions)[..],
            [OutboundMessage::BlockProposal(_)]
        ));
        assert_eq!(h.chronology.cursor(), SubroundId::Signature);

        let actions = h.tick(0, 0.55);
        assert!(matches!(
            broadcasts(&actions)[..],
            [OutboundMessage::PartialSignature(_)]
        ));

        let actions = h.tick(0, 0.9);
        let committed = commits(&actions);
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].header.round, Round(0));
        assert_eq!(committed[0].signers.set_indices().collect::<Vec<_>>(), vec![0]);
        assert!(matches!(
            broadcasts(&actions)[..],
            [OutboundMessage::FinalizedBlock(_)]
        ));

        let state = h.chronology.state().unwrap();
        assert_eq!(state.outcome(), ConsensusOutcome::Finalized);
        assert_eq!(h.chronology.stats().rounds_finalized, 1);
        assert!(logs_contain("Round finalized"));
    }

    #[traced_test]
    #[test]
    fn test_late_first_tick_runs_pipeline_in_order() {
        let mut h = harness_with(1, |_| ValidatorId(0), |b| b);

        // Every subround whose start has passed runs in one tick.
        let actions = h.tick(0, 0.9);
        assert_eq!(commits(&actions).len(), 1);
        assert_eq!(broadcasts(&actions).len(), 3);
        assert!(logs_contain("Subround entered behind schedule"));
    }

    /// Validator with the round-0 candidate and its own signature plus one
    /// other, one signature short of quorum at 0.6 of the round.
    fn one_signature_short() -> (Harness, BlockHeader, ValidatorId) {
        let mut h = validator_harness();
        let leader = h.leader(0);
        let me = h.chronology.self_id();
        let header = test_header(SHARD, Epoch(0), Round(0), leader);

        h.deliver(leader, 0, BlockProposal::new(header.clone()));
        h.tick(0, 0.1);
        h.tick(0, 0.55);
        h.deliver(leader, 0, sign_header(h.validators.key(leader), SHARD, &header));
        h.tick(0, 0.6);
        assert_eq!(h.chronology.state().unwrap().signed_weight(), 2);

        let last = (0..4)
            .map(ValidatorId)
            .find(|id| *id != leader && *id != me)
            .unwrap();
        (h, header, last)
    }

    #[traced_test]
    #[test]
    fn test_quorum_in_extension_window_finalizes() {
        let (mut h, header, last) = one_signature_short();

        let actions = h.tick(0, 0.86);
        assert_eq!(
            h.chronology.state().unwrap().subround_status(SubroundId::Signature),
            SubroundStatus::Extended
        );
        assert!(commits(&actions).is_empty());

        h.deliver(last, 0, sign_header(h.validators.key(last), SHARD, &header));
        let actions = h.tick(0, 0.9);
        let committed = commits(&actions);
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].signers.count(), 3);
        assert_eq!(h.chronology.stats().subround_failures, 0);
        assert!(logs_contain("Subround extended"));
    }

    #[test]
    fn test_quorum_after_extended_deadline_abandons() {
        let (mut h, header, last) = one_signature_short();
        h.tick(0, 0.9);

        // Arrives after 0.95 but is first seen by the tick at 0.96.
        h.deliver(last, 0, sign_header(h.validators.key(last), SHARD, &header));
        let actions = h.tick(0, 0.96);

        assert!(commits(&actions).is_empty());
        let state = h.chronology.state().unwrap();
        assert_eq!(state.subround_status(SubroundId::Signature), SubroundStatus::Failed);
        assert_eq!(state.outcome(), ConsensusOutcome::Abandoned);
        let stats = h.chronology.stats();
        assert_eq!(stats.subround_failures, 1);
        assert_eq!(stats.rounds_abandoned, 1);
        assert_eq!(stats.rounds_finalized, 0);
    }

    #[test]
    fn test_signature_extension_rebroadcasts_once() {
        let (mut h, _, _) = one_signature_short();
        let own = h.chronology.state().unwrap().own_signature().cloned().unwrap();

        let actions = h.tick(0, 0.86);
        let sent = broadcasts(&actions);
        assert_eq!(sent.len(), 1);
        match sent[0] {
            OutboundMessage::PartialSignature(message) => {
                assert_eq!(
                    message.decode_payload().unwrap(),
                    Payload::PartialSignature(own)
                );
            }
            other => panic!("unexpected broadcast {other:?}"),
        }

        assert!(broadcasts(&h.tick(0, 0.9)).is_empty());
        assert!(broadcasts(&h.tick(0, 0.94)).is_empty());
    }

    #[test]
    fn test_block_extension_retries_assembly() {
        let assembler = Arc::new(TestAssembler::new());
        assembler.set_produce(false);
        let mut h = harness_with(
            4,
            |epoch| epoch.leader_for(Round(0)),
            |b| b.block_assembler(assembler.clone()),
        );
        assert!(h.chronology.state().is_none());

        assert!(broadcasts(&h.tick(0, 0.1)).is_empty());
        assembler.set_produce(true);
        // Still inside the window: the job already ran and is not repeated.
        assert!(broadcasts(&h.tick(0, 0.3)).is_empty());
        assert_eq!(assembler.assembled(), 0);

        let actions = h.tick(0, 0.52);
        assert_eq!(assembler.assembled(), 1);
        assert!(broadcasts(&actions)
            .iter()
            .any(|m| matches!(m, OutboundMessage::BlockProposal(_))));
        let state = h.chronology.state().unwrap();
        assert!(state.candidate().is_some());
        assert_eq!(state.subround_status(SubroundId::Block), SubroundStatus::Completed);
    }

    #[traced_test]
    #[test]
    fn test_validator_follows_leader_to_finalization() {
        let mut h = validator_harness();
        let leader = h.leader(0);
        let me = h.chronology.self_id();
        let header = test_header(SHARD, Epoch(0), Round(0), leader);

        h.deliver(leader, 0, BlockProposal::new(header.clone()));
        h.tick(0, 0.1);
        assert_eq!(
            h.chronology.state().unwrap().candidate().map(|c| c.hash),
            Some(header.hash())
        );

        let actions = h.tick(0, 0.55);
        assert!(matches!(
            broadcasts(&actions)[..],
            [OutboundMessage::PartialSignature(_)]
        ));
        assert!(h.chronology.state().unwrap().has_signature_from(me));

        let others: Vec<ValidatorId> = (0..4)
            .map(ValidatorId)
            .filter(|id| *id != me)
            .take(2)
            .collect();
        for signer in &others {
            h.deliver(*signer, 0, sign_header(h.validators.key(*signer), SHARD, &header));
        }
        h.tick(0, 0.6);
        assert_eq!(
            h.chronology.state().unwrap().subround_status(SubroundId::Signature),
            SubroundStatus::Completed
        );

        let actions = h.tick(0, 0.9);
        let committed = commits(&actions);
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].signers.count(), 3);
        // Only the leader broadcasts the finalized artifact.
        assert!(broadcasts(&actions).is_empty());
    }

    #[traced_test]
    #[test]
    fn test_missing_proposal_abandons_round() {
        let mut h = validator_harness();

        h.tick(0, 0.1);
        h.tick(0, 0.65);
        assert_eq!(
            h.chronology.state().unwrap().subround_status(SubroundId::Block),
            SubroundStatus::Failed
        );
        assert_eq!(h.chronology.cursor(), SubroundId::End);

        let actions = h.tick(0, 0.9);
        assert!(commits(&actions).is_empty());
        assert_eq!(
            h.chronology.state().unwrap().outcome(),
            ConsensusOutcome::Abandoned
        );
        let stats = h.chronology.stats();
        assert_eq!(stats.subround_failures, 1);
        assert_eq!(stats.rounds_abandoned, 1);
        assert!(logs_contain("Subround missed its deadline"));

        // Next round starts fresh without counting round 0 again.
        h.tick(1, 0.0);
        assert_eq!(h.chronology.current_round(), Some(Round(1)));
        assert_eq!(h.chronology.stats().rounds_abandoned, 1);
    }

    #[test]
    fn test_abort_policy_ends_round_immediately() {
        let mut config = ConsensusConfig::default();
        config.schedule.block = config.schedule.block.on_failure(FailurePolicy::AbortRound);
        let mut h = harness_with(
            4,
            |epoch| ValidatorId((epoch.leader_for(Round(0)).0 + 1) % 4),
            |b| b.config(config),
        );

        h.tick(0, 0.65);
        let state = h.chronology.state().unwrap();
        assert_eq!(state.outcome(), ConsensusOutcome::Abandoned);
        assert_eq!(state.subround_status(SubroundId::End), SubroundStatus::Completed);
        assert_eq!(state.subround_status(SubroundId::Signature), SubroundStatus::Pending);

        assert!(h.tick(0, 0.9).is_empty());
        assert_eq!(h.chronology.stats().rounds_abandoned, 1);
    }

    #[test]
    fn test_proposal_from_non_leader_dropped() {
        let mut h = validator_harness();
        let leader = h.leader(0);
        let me = h.chronology.self_id();
        let impostor = (0..4)
            .map(ValidatorId)
            .find(|id| *id != leader && *id != me)
            .unwrap();

        h.tick(0, 0.0);
        let header = test_header(SHARD, Epoch(0), Round(0), impostor);
        h.deliver(impostor, 0, BlockProposal::new(header));
        h.tick(0, 0.1);

        assert!(h.chronology.state().unwrap().candidate().is_none());
        assert_eq!(h.chronology.stats().messages_dropped, 1);
    }

    #[test]
    fn test_rollover_rearms_watchdog_and_abandons_previous() {
        let mut h = validator_harness();

        h.tick(0, 0.1);
        assert_eq!(h.watchdog.armings(), 1);

        h.tick(1, 0.1);
        assert_eq!(h.watchdog.armings(), 2);
        assert_eq!(h.chronology.current_round(), Some(Round(1)));
        assert_eq!(h.chronology.stats().rounds_abandoned, 1);
        assert_eq!(h.chronology.worker().current_round(), Round(1));

        // Time going backwards never reopens an earlier round.
        h.tick(0, 0.5);
        assert_eq!(h.chronology.current_round(), Some(Round(1)));
    }

    #[test]
    fn test_before_genesis_does_nothing() {
        let mut h = validator_harness();
        h.clock.set(GENESIS - Duration::from_secs(1));

        assert!(h.chronology.tick().is_empty());
        assert_eq!(h.chronology.current_round(), None);
        assert_eq!(h.watchdog.armings(), 0);
    }

    #[traced_test]
    #[test]
    fn test_stop_disarms_and_goes_quiet() {
        let mut h = harness_with(1, |_| ValidatorId(0), |b| b);
        h.tick(0, 0.1);
        assert!(h.watchdog.is_armed());

        h.chronology.stop();
        assert!(h.chronology.is_stopped());
        assert!(!h.watchdog.is_armed());
        assert!(h.tick(0, 0.9).is_empty());
        assert!(h.tick(1, 0.9).is_empty());
        assert!(logs_contain("Chronology stopped"));
    }

    #[test]
    fn test_leader_signs_proposal_from_activation_round() {
        let mut h = harness_with(
            1,
            |_| ValidatorId(0),
            |b| {
                b.round_gate(Arc::new(
                    ActivationRounds::none().with(ConsensusFlag::LeaderSignsProposal, Round(1)),
                ))
            },
        );

        let proposal_signature = |actions: &[Action]| {
            broadcasts(actions).iter().find_map(|m| match m {
                OutboundMessage::BlockProposal(message) => match message.decode_payload() {
                    Ok(Payload::BlockProposal(p)) => Some(p.leader_signature.is_some()),
                    _ => None,
                },
                _ => None,
            })
        };

        let actions = h.tick(0, 0.1);
        assert!(!h.chronology.leader_signs_proposal());
        assert_eq!(proposal_signature(&actions), Some(false));

        let actions = h.tick(1, 0.1);
        assert!(h.chronology.leader_signs_proposal());
        assert_eq!(proposal_signature(&actions), Some(true));

        // The signature went out with the proposal; nothing separate follows.
        let actions = h.tick(1, 0.55);
        assert!(broadcasts(&actions).is_empty());
        assert!(h.chronology.state().unwrap().has_quorum());
    }

    #[test]
    fn test_resync_request_counted() {
        let mut h = validator_harness();
        h.tick(0, 0.1);
        h.chronology.on_resync_requested(&ResyncRequest {
            round: Round(0),
            stalled_for: Duration::from_secs(30),
        });
        assert_eq!(h.chronology.stats().resync_requests, 1);
    }
}
