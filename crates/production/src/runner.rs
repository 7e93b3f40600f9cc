//! Production runner.
//!
//! Owns one node's [`Chronology`] and performs everything it asks for: ticks
//! it on a fixed interval, publishes its broadcasts, hands finalized headers
//! to the committer and forwards watchdog expiries to the resync trigger.
//! Inbound frames are handled on a separate task that feeds the worker.

use crate::network::{
    encode_message, run_inbound, InboundHandler, NetworkError, RateLimitConfig, Transport,
    WireFrame,
};
use spos_bft::{Chronology, ChronologyStats};
use spos_core::{Action, BlockCommitter, ConfigError, ResyncRequest, ResyncTrigger};
use spos_types::ShardId;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, info_span, trace, warn, Instrument};

/// Errors from the production runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

/// Handle for shutting down a running [`ProductionRunner`].
///
/// When dropped, signals the runner to exit gracefully.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl ShutdownHandle {
    /// Trigger shutdown (consumes the handle).
    pub fn shutdown(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Builder for constructing a [`ProductionRunner`].
///
/// Required: `chronology`, `transport`, `committer`, `resync_trigger`.
/// Optional: `resync_receiver` (omit when the watchdog is disabled) and
/// `rate_limit` (defaults to [`RateLimitConfig::default`]).
#[derive(Default)]
pub struct ProductionRunnerBuilder {
    chronology: Option<Chronology>,
    transport: Option<Arc<dyn Transport>>,
    committer: Option<Arc<dyn BlockCommitter>>,
    resync_trigger: Option<Arc<dyn ResyncTrigger>>,
    resync_rx: Option<mpsc::UnboundedReceiver<ResyncRequest>>,
    rate_limit: RateLimitConfig,
}

impl ProductionRunnerBuilder {
    pub fn chronology(mut self, chronology: Chronology) -> Self {
        self.chronology = Some(chronology);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn committer(mut self, committer: Arc<dyn BlockCommitter>) -> Self {
        self.committer = Some(committer);
        self
    }

    pub fn resync_trigger(mut self, trigger: Arc<dyn ResyncTrigger>) -> Self {
        self.resync_trigger = Some(trigger);
        self
    }

    /// Channel on which the watchdog delivers expiries.
    pub fn resync_receiver(mut self, rx: mpsc::UnboundedReceiver<ResyncRequest>) -> Self {
        self.resync_rx = Some(rx);
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    pub fn build(self) -> Result<ProductionRunner, RunnerError> {
        let chronology = self
            .chronology
            .ok_or(ConfigError::MissingDependency("chronology"))?;
        let transport = self
            .transport
            .ok_or(ConfigError::MissingDependency("transport"))?;
        let committer = self
            .committer
            .ok_or(ConfigError::MissingDependency("block committer"))?;
        let resync_trigger = self
            .resync_trigger
            .ok_or(ConfigError::MissingDependency("resync trigger"))?;

        let inbound = Arc::new(InboundHandler::new(
            chronology.shard(),
            chronology.worker(),
            chronology.epochs(),
            self.rate_limit,
        ));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        Ok(ProductionRunner {
            chronology,
            transport,
            committer,
            resync_trigger,
            resync_rx: self.resync_rx,
            inbound,
            shutdown_rx,
            shutdown_tx: Some(shutdown_tx),
        })
    }
}

/// Drives one validator until shut down.
pub struct ProductionRunner {
    chronology: Chronology,
    transport: Arc<dyn Transport>,
    committer: Arc<dyn BlockCommitter>,
    resync_trigger: Arc<dyn ResyncTrigger>,
    resync_rx: Option<mpsc::UnboundedReceiver<ResyncRequest>>,
    inbound: Arc<InboundHandler>,
    shutdown_rx: oneshot::Receiver<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ProductionRunner {
    pub fn builder() -> ProductionRunnerBuilder {
        ProductionRunnerBuilder::default()
    }

    /// Take the shutdown handle.
    ///
    /// Can only be called once; subsequent calls return None.
    pub fn shutdown_handle(&mut self) -> Option<ShutdownHandle> {
        self.shutdown_tx
            .take()
            .map(|tx| ShutdownHandle { tx: Some(tx) })
    }

    /// Run until the shutdown handle fires (or is dropped).
    ///
    /// Returns the scheduler's statistics at shutdown.
    pub async fn run(self) -> Result<ChronologyStats, RunnerError> {
        let span = info_span!("validator", id = self.chronology.self_id().0);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> Result<ChronologyStats, RunnerError> {
        let Self {
            mut chronology,
            transport,
            committer,
            resync_trigger,
            mut resync_rx,
            inbound,
            mut shutdown_rx,
            shutdown_tx,
        } = self;
        // Dropping an untaken sender would read as a shutdown request.
        let _shutdown_tx = shutdown_tx;

        let shard = chronology.shard();
        let inbound_task = tokio::spawn(
            run_inbound(inbound, transport.subscribe()).in_current_span(),
        );

        let mut ticker = tokio::time::interval(chronology.config().tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            shard = shard.0,
            tick_interval = ?chronology.config().tick_interval,
            "Runner started"
        );

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => {
                    info!("Shutdown signal received");
                    break;
                }

                Some(request) = recv_resync(&mut resync_rx) => {
                    chronology.on_resync_requested(&request);
                    resync_trigger.request_resync(request);
                }

                _ = ticker.tick() => {
                    for action in chronology.tick() {
                        execute(shard, action, transport.as_ref(), committer.as_ref());
                    }
                }
            }
        }

        chronology.stop();
        inbound_task.abort();
        Ok(chronology.stats())
    }
}

async fn recv_resync(
    rx: &mut Option<mpsc::UnboundedReceiver<ResyncRequest>>,
) -> Option<ResyncRequest> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn execute(
    shard: ShardId,
    action: Action,
    transport: &dyn Transport,
    committer: &dyn BlockCommitter,
) {
    trace!(action = action.type_name(), "Executing action");
    match action {
        Action::Broadcast { message } => {
            let data = match encode_message(&message) {
                Ok(data) => data,
                Err(e) => {
                    warn!(error = %e, kind = message.type_name(), "Failed to encode message");
                    return;
                }
            };
            let frame = WireFrame {
                topic: message.topic(shard),
                data,
            };
            if let Err(e) = transport.publish(frame) {
                debug!(error = %e, kind = message.type_name(), "Broadcast not delivered");
            }
        }
        Action::CommitBlock { block } => committer.commit(&block),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::LocalChain;
    use crate::network::LocalNetwork;
    use crate::watchdog::TokioWatchdog;
    use parking_lot::Mutex;
    use spos_bft::{ConsensusConfig, EpochSnapshots, EpochState};
    use spos_clock::{DisabledWatchdog, RoundHandler, Watchdog};
    use spos_core::{ActivationRounds, NoopStatusSink, TimeSource};
    use spos_test_helpers::validator_set;
    use spos_types::{Epoch, Hash, QuorumThreshold, ValidatorId};
    use std::time::Duration;

    /// Wall clock that follows tokio's (pausable) time.
    struct TokioClock {
        base: Duration,
        start: tokio::time::Instant,
    }

    impl TimeSource for TokioClock {
        fn now(&self) -> Duration {
            self.base + self.start.elapsed()
        }
    }

    #[derive(Default)]
    struct RecordingTrigger(Mutex<Vec<ResyncRequest>>);

    impl ResyncTrigger for RecordingTrigger {
        fn request_resync(&self, request: ResyncRequest) {
            self.0.lock().push(request);
        }
    }

    fn chronology(
        watchdog: Arc<dyn Watchdog>,
        chain: Arc<LocalChain>,
        config: ConsensusConfig,
    ) -> Chronology {
        let v = validator_set(1);
        let epochs = Arc::new(EpochSnapshots::new(
            EpochState::new(Epoch(0), v.set.clone(), QuorumThreshold::SuperMajority, Hash::ZERO)
                .unwrap(),
        ));
        let clock: Arc<dyn TimeSource> = Arc::new(TokioClock {
            base: Duration::from_secs(1_000),
            start: tokio::time::Instant::now(),
        });
        let round_handler = RoundHandler::builder()
            .genesis(Duration::from_secs(1_000))
            .round_duration(Duration::from_secs(1))
            .time_source(clock)
            .build()
            .unwrap();

        Chronology::builder()
            .config(config)
            .shard(ShardId(0))
            .identity(ValidatorId(0), Arc::new(v.keys[0].clone()))
            .round_handler(round_handler)
            .watchdog(watchdog)
            .status_sink(Arc::new(NoopStatusSink))
            .epochs(epochs)
            .block_assembler(chain)
            .round_gate(Arc::new(ActivationRounds::none()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_dependencies() {
        assert!(matches!(
            ProductionRunner::builder().build(),
            Err(RunnerError::Config(ConfigError::MissingDependency("chronology")))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_validator_commits() {
        let chain = Arc::new(LocalChain::new());
        let chronology = chronology(
            Arc::new(DisabledWatchdog),
            chain.clone(),
            ConsensusConfig::default(),
        );
        let network = LocalNetwork::new(64);

        let mut runner = ProductionRunner::builder()
            .chronology(chronology)
            .transport(Arc::new(network))
            .committer(chain.clone())
            .resync_trigger(Arc::new(RecordingTrigger::default()))
            .build()
            .unwrap();
        let shutdown = runner.shutdown_handle().unwrap();
        let task = tokio::spawn(runner.run());

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        shutdown.shutdown();
        let stats = task.await.unwrap().unwrap();

        assert!(stats.rounds_finalized >= 3);
        assert_eq!(chain.height(), stats.rounds_finalized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_expiry_reaches_trigger() {
        let chain = Arc::new(LocalChain::new());
        let (watchdog, resync_rx) = TokioWatchdog::new();
        let config = ConsensusConfig {
            watchdog_timeout: Duration::from_millis(500),
            ..ConsensusConfig::default()
        };
        let chronology = chronology(Arc::new(watchdog), chain.clone(), config);
        let trigger = Arc::new(RecordingTrigger::default());

        let mut runner = ProductionRunner::builder()
            .chronology(chronology)
            .transport(Arc::new(LocalNetwork::new(64)))
            .committer(chain)
            .resync_trigger(trigger.clone())
            .resync_receiver(resync_rx)
            .build()
            .unwrap();
        let shutdown = runner.shutdown_handle().unwrap();
        let task = tokio::spawn(runner.run());

        tokio::time::sleep(Duration::from_millis(1_800)).await;
        shutdown.shutdown();
        let stats = task.await.unwrap().unwrap();

        let fired = trigger.0.lock().len() as u64;
        assert!(fired >= 1);
        assert_eq!(stats.resync_requests, fired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_runner() {
        let chain = Arc::new(LocalChain::new());
        let chronology = chronology(
            Arc::new(DisabledWatchdog),
            chain.clone(),
            ConsensusConfig::default(),
        );
        let mut runner = ProductionRunner::builder()
            .chronology(chronology)
            .transport(Arc::new(LocalNetwork::new(8)))
            .committer(chain)
            .resync_trigger(Arc::new(RecordingTrigger::default()))
            .build()
            .unwrap();
        let shutdown = runner.shutdown_handle().unwrap();
        assert!(runner.shutdown_handle().is_none());

        let task = tokio::spawn(runner.run());
        drop(shutdown);
        assert!(task.await.unwrap().is_ok());
    }
}
