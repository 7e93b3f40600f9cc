//! Simulation runner that orchestrates nodes and the delivery queue.

use crate::chain::SimChain;
use crate::network::{NetworkConfig, SimulatedNetwork};
use crate::node::SimNode;
use crate::NodeIndex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use spos_bft::{Chronology, ConsensusConfig, EpochSnapshots, EpochState};
use spos_clock::{ManualClock, ManualWatchdog, RoundHandler};
use spos_core::{Action, ActivationRounds, BlockCommitter, ConfigError, NoopStatusSink, TimeSource};
use spos_messages::ConsensusMessage;
use spos_test_helpers::TestValidators;
use spos_types::{Epoch, Hash, KeyPair, Round, ShardId, ValidatorId};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Parameters shared by every node of a simulation.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub shard: ShardId,
    /// Genesis as a duration since the Unix epoch. The clock starts here.
    pub genesis: Duration,
    pub round_duration: Duration,
    /// Scheduler configuration. Its tick interval is the simulation step.
    pub consensus: ConsensusConfig,
    pub epoch_seed: Hash,
    pub activation: ActivationRounds,
    pub network: NetworkConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            shard: ShardId(0),
            genesis: Duration::from_secs(1_000),
            round_duration: Duration::from_secs(5),
            consensus: ConsensusConfig::default(),
            epoch_seed: Hash::ZERO,
            activation: ActivationRounds::none(),
            network: NetworkConfig::default(),
        }
    }
}

/// Statistics collected during simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationStats {
    /// Clock steps taken.
    pub steps: u64,
    /// Messages handed to the network (one per recipient).
    pub messages_sent: u64,
    /// Messages that reached a worker and were accepted.
    pub messages_delivered: u64,
    /// Messages rejected by the receiving worker.
    pub messages_rejected: u64,
    /// Messages dropped by a partition.
    pub messages_dropped_partition: u64,
    /// Messages dropped by packet loss.
    pub messages_dropped_loss: u64,
    /// Finalized blocks handed to a committer.
    pub commits: u64,
}

#[derive(Debug)]
struct Delivery {
    to: NodeIndex,
    message: ConsensusMessage,
}

/// Deterministic multi-node simulation.
pub struct SimulationRunner {
    config: SimulationConfig,
    clock: ManualClock,
    epoch: EpochState,
    validators: TestValidators,
    nodes: Vec<SimNode>,
    network: SimulatedNetwork,
    rng: ChaCha8Rng,
    /// Pending deliveries ordered by (delivery time, sequence).
    queue: BTreeMap<(Duration, u64), Delivery>,
    sequence: u64,
    stats: SimulationStats,
}

impl SimulationRunner {
    /// Create an empty simulation over `validators`. Add nodes before running.
    pub fn new(
        config: SimulationConfig,
        validators: TestValidators,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        config.consensus.validate()?;
        let epoch = EpochState::new(
            Epoch(0),
            validators.set.clone(),
            config.consensus.quorum_threshold,
            config.epoch_seed,
        )?;

        Ok(Self {
            clock: ManualClock::new(config.genesis),
            network: SimulatedNetwork::new(config.network.clone()),
            config,
            epoch,
            validators,
            nodes: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            queue: BTreeMap::new(),
            sequence: 0,
            stats: SimulationStats::default(),
        })
    }

    /// A simulation with one node per validator, in set order.
    pub fn with_all_validators(
        config: SimulationConfig,
        validators: TestValidators,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        let ids: Vec<ValidatorId> = validators.set.iter().map(|v| v.validator_id).collect();
        let mut runner = Self::new(config, validators, seed)?;
        for id in ids {
            runner.add_validator(id)?;
        }
        Ok(runner)
    }

    /// Add a node for the validator `id`, using its key from the set.
    pub fn add_validator(&mut self, id: ValidatorId) -> Result<NodeIndex, ConfigError> {
        let index = self
            .validators
            .set
            .index_of(id)
            .ok_or_else(|| ConfigError::Invalid(format!("{id} is not in the validator set")))?;
        let key = self.validators.keys[index].clone();
        self.add_node(id, key)
    }

    /// Add a node that is not in the eligible set.
    pub fn add_observer(&mut self, id: ValidatorId, key: KeyPair) -> Result<NodeIndex, ConfigError> {
        if self.epoch.validators().contains(id) {
            return Err(ConfigError::Invalid(format!("{id} is an eligible validator")));
        }
        self.add_node(id, key)
    }

    fn add_node(&mut self, id: ValidatorId, key: KeyPair) -> Result<NodeIndex, ConfigError> {
        let clock: Arc<dyn TimeSource> = Arc::new(self.clock.clone());
        let round_handler = RoundHandler::builder()
            .genesis(self.config.genesis)
            .round_duration(self.config.round_duration)
            .time_source(clock.clone())
            .build()?;
        let watchdog = Arc::new(ManualWatchdog::new(clock));
        let chain = Arc::new(SimChain::new());

        let chronology = Chronology::builder()
            .config(self.config.consensus.clone())
            .shard(self.config.shard)
            .identity(id, Arc::new(key))
            .round_handler(round_handler)
            .watchdog(watchdog.clone())
            .status_sink(Arc::new(NoopStatusSink))
            .epochs(Arc::new(EpochSnapshots::new(self.epoch.clone())))
            .block_assembler(chain.clone())
            .round_gate(Arc::new(self.config.activation.clone()))
            .build()?;

        let index = self.nodes.len() as NodeIndex;
        self.nodes.push(SimNode::new(index, chronology, watchdog, chain));
        debug!(node = index, validator = id.0, "Added simulated node");
        Ok(index)
    }

    // ─── Accessors ───

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The genesis epoch every node starts from.
    pub fn epoch(&self) -> &EpochState {
        &self.epoch
    }

    pub fn leader_for(&self, round: Round) -> ValidatorId {
        self.epoch.leader_for(round)
    }

    pub fn node(&self, index: NodeIndex) -> Option<&SimNode> {
        self.nodes.get(index as usize)
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn network_mut(&mut self) -> &mut SimulatedNetwork {
        &mut self.network
    }

    pub fn stats(&self) -> SimulationStats {
        self.stats
    }

    /// Start of `round` on the simulation clock.
    pub fn round_start(&self, round: Round) -> Duration {
        self.config.genesis + self.config.round_duration * round.0 as u32
    }

    // ─── Control ───

    /// Deliver `message` to node `to` at time `at`, bypassing the network.
    pub fn inject(&mut self, at: Duration, to: NodeIndex, message: ConsensusMessage) {
        self.enqueue(at, to, message);
    }

    /// Freeze a node's scheduler. Its watchdog keeps being polled.
    pub fn stall(&mut self, index: NodeIndex) {
        if let Some(node) = self.nodes.get_mut(index as usize) {
            node.stall();
        }
    }

    pub fn resume(&mut self, index: NodeIndex) {
        if let Some(node) = self.nodes.get_mut(index as usize) {
            node.resume();
        }
    }

    /// Stop every node's scheduler.
    pub fn stop_all(&mut self) {
        for node in &mut self.nodes {
            node.stop();
        }
    }

    /// Advance the clock in tick-interval steps until `end`.
    ///
    /// Each step delivers due messages, ticks every node and polls every
    /// watchdog, in node order.
    pub fn run_until(&mut self, end: Duration) {
        let step = self.config.consensus.tick_interval;
        while self.clock.now() < end {
            let now = (self.clock.now() + step).min(end);
            self.clock.set(now);
            self.step(now);
        }
    }

    fn step(&mut self, now: Duration) {
        self.stats.steps += 1;
        self.deliver_due(now);

        for index in 0..self.nodes.len() {
            let actions = self.nodes[index].tick(now);
            for action in actions {
                self.route(index as NodeIndex, now, action);
            }
        }

        for node in &mut self.nodes {
            node.poll_watchdog();
        }
    }

    fn deliver_due(&mut self, now: Duration) {
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let Delivery { to, message } = entry.remove();
            let Some(node) = self.nodes.get(to as usize) else {
                continue;
            };
            match node.chronology().worker().receive(message) {
                Ok(()) => self.stats.messages_delivered += 1,
                Err(e) => {
                    trace!(node = to, error = %e, "Delivery rejected");
                    self.stats.messages_rejected += 1;
                }
            }
        }
    }

    fn route(&mut self, from: NodeIndex, now: Duration, action: Action) {
        match action {
            Action::Broadcast { message } => {
                let message = message.into_message();
                for to in 0..self.nodes.len() as NodeIndex {
                    if to == from {
                        continue;
                    }
                    if self.network.is_partitioned(from, to) {
                        self.stats.messages_dropped_partition += 1;
                        continue;
                    }
                    if self.network.should_drop_packet(&mut self.rng) {
                        self.stats.messages_dropped_loss += 1;
                        continue;
                    }
                    let latency = self.network.sample_latency(&mut self.rng);
                    self.stats.messages_sent += 1;
                    self.enqueue(now + latency, to, message.clone());
                }
            }
            Action::CommitBlock { block } => {
                self.stats.commits += 1;
                self.nodes[from as usize].chain().commit(&block);
            }
        }
    }

    fn enqueue(&mut self, at: Duration, to: NodeIndex, message: ConsensusMessage) {
        let sequence = self.sequence;
        self.sequence += 1;
        self.queue.insert((at, sequence), Delivery { to, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spos_test_helpers::{deterministic_key, validator_set};

    #[test]
    fn test_observer_must_not_be_eligible() {
        let mut runner =
            SimulationRunner::new(SimulationConfig::default(), validator_set(4), 1).unwrap();
        assert!(runner
            .add_observer(ValidatorId(2), deterministic_key(2))
            .is_err());
        assert!(runner
            .add_observer(ValidatorId(9), deterministic_key(9))
            .is_ok());
        assert!(runner.add_validator(ValidatorId(9)).is_err());
    }

    #[test]
    fn test_clock_steps_to_end() {
        let config = SimulationConfig::default();
        let genesis = config.genesis;
        let mut runner = SimulationRunner::with_all_validators(config, validator_set(1), 1).unwrap();

        runner.run_until(genesis + Duration::from_millis(105));
        assert_eq!(runner.now(), genesis + Duration::from_millis(105));
        // Ten full 10ms steps and one partial step.
        assert_eq!(runner.stats().steps, 11);
    }

    #[test]
    fn test_round_start() {
        let runner =
            SimulationRunner::new(SimulationConfig::default(), validator_set(1), 1).unwrap();
        assert_eq!(
            runner.round_start(Round(3)),
            Duration::from_secs(1_000 + 15)
        );
    }
}
