//! SPOS devnet
//!
//! Runs every validator of a config file in one process, connected by an
//! in-memory gossip bus.
//!
//! # Usage
//!
//! ```bash
//! spos-devnet --config devnet.toml
//!
//! # Stop after a minute and write metrics
//! spos-devnet --config devnet.toml --duration-secs 60
//! ```
//!
//! See `DevnetConfig` for the file format.

use anyhow::{Context, Result};
use clap::Parser;
use prometheus::Registry;
use spos_bft::{Chronology, EpochSnapshots};
use spos_clock::{RoundHandler, SyncTimer, SystemClock};
use spos_core::{ResyncRequest, ResyncTrigger, TimeSource};
use spos_production::network::LocalNetwork;
use spos_production::{
    init_logging, render_metrics, spawn_offset_refresh, DevnetConfig, FixedOffsetSource,
    LocalChain, ProductionRunner, PrometheusStatusSink, ShutdownHandle, TokioWatchdog,
};
use spos_types::ValidatorId;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

/// SPOS devnet
///
/// Runs a local validator set participating in SPOS consensus.
#[derive(Parser, Debug)]
#[command(name = "spos-devnet")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Log level filter (RUST_LOG takes precedence)
    #[arg(long)]
    log_level: Option<String>,

    /// Stop after this many seconds instead of waiting for a signal
    #[arg(long)]
    duration_secs: Option<u64>,
}

/// Devnets have no peer to sync from; expiries are only logged.
struct LoggingResyncTrigger {
    validator: ValidatorId,
}

impl ResyncTrigger for LoggingResyncTrigger {
    fn request_resync(&self, request: ResyncRequest) {
        warn!(
            validator = self.validator.0,
            round = request.round.0,
            stalled_for = ?request.stalled_for,
            "Validator stalled; no sync source configured"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref()).context("Failed to initialize logging")?;

    let config = DevnetConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    let genesis = config.genesis(SystemClock.now());
    info!(
        validators = config.validators.len(),
        shard = config.network.shard,
        round_duration = ?config.round_duration(),
        genesis_unix_ms = genesis.as_millis() as u64,
        "Starting devnet"
    );

    let registry = Registry::new();
    let network = Arc::new(LocalNetwork::new(config.network.channel_capacity));
    let mut shutdown_handles: Vec<ShutdownHandle> = Vec::new();
    let mut runners = Vec::new();
    let mut refresh_tasks = Vec::new();

    for entry in &config.validators {
        let validator = entry.validator_id();
        let signing_key = Arc::new(entry.key_pair()?);

        let timer = Arc::new(SyncTimer::new(
            Arc::new(SystemClock),
            Arc::new(FixedOffsetSource::new(config.time_sync.offset_nanos)),
        ));
        refresh_tasks.push(spawn_offset_refresh(
            timer.clone(),
            config.time_sync_interval(),
        ));

        let round_handler = RoundHandler::builder()
            .genesis(genesis)
            .round_duration(config.round_duration())
            .time_source(timer)
            .build()?;

        let (watchdog, resync_rx) = TokioWatchdog::new();
        let status = PrometheusStatusSink::register(&registry, validator)
            .with_context(|| format!("Failed to register metrics for {validator}"))?;
        let chain = Arc::new(LocalChain::new());

        let chronology = Chronology::builder()
            .config(config.consensus_config())
            .shard(config.shard())
            .identity(validator, signing_key)
            .round_handler(round_handler)
            .watchdog(Arc::new(watchdog))
            .status_sink(Arc::new(status))
            .epochs(Arc::new(EpochSnapshots::new(config.epoch_state()?)))
            .block_assembler(chain.clone())
            .round_gate(Arc::new(config.activation_rounds()))
            .build()
            .with_context(|| format!("Failed to build scheduler for {validator}"))?;

        let mut runner = ProductionRunner::builder()
            .chronology(chronology)
            .transport(network.clone())
            .committer(chain)
            .resync_trigger(Arc::new(LoggingResyncTrigger { validator }))
            .resync_receiver(resync_rx)
            .rate_limit(config.rate_limit())
            .build()?;

        if let Some(handle) = runner.shutdown_handle() {
            shutdown_handles.push(handle);
        }
        runners.push((validator, tokio::spawn(runner.run())));
    }

    wait_for_shutdown(cli.duration_secs).await;
    info!("Initiating graceful shutdown...");
    for handle in shutdown_handles {
        handle.shutdown();
    }

    for (validator, task) in runners {
        match task.await {
            Ok(Ok(stats)) => info!(
                validator = validator.0,
                started = stats.rounds_started,
                finalized = stats.rounds_finalized,
                abandoned = stats.rounds_abandoned,
                subround_failures = stats.subround_failures,
                dropped = stats.messages_dropped,
                resyncs = stats.resync_requests,
                "Validator stopped"
            ),
            Ok(Err(e)) => warn!(validator = validator.0, error = %e, "Validator failed"),
            Err(e) => warn!(validator = validator.0, error = %e, "Validator task panicked"),
        }
    }
    for task in refresh_tasks {
        task.abort();
    }

    if let Some(path) = &config.metrics.dump_path {
        let text = render_metrics(&registry).context("Failed to render metrics")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
        info!(path = %path.display(), "Metrics written");
    }

    Ok(())
}

async fn wait_for_shutdown(duration_secs: Option<u64>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let deadline = async {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
        _ = deadline => info!("Run duration elapsed"),
    }
}
