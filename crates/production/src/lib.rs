//! Production runner with async I/O.
//!
//! Wraps the synchronous round scheduler with real I/O:
//!
//! - Scheduler ticks via a tokio interval
//! - Broadcasts via a [`Transport`](network::Transport), encoded with bincode + lz4
//! - Watchdog expiries via tokio timers ([`TokioWatchdog`])
//! - Clock offset refresh on the blocking pool
//! - Status metrics via Prometheus
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Validator task                          │
//! │                                                                  │
//! │  ProductionRunner                                                │
//! │    └─ loop { select!(shutdown, resync, tick) → execute actions } │
//! │                         │                                        │
//! │     ┌───────────────────┼────────────────────┐                   │
//! │     ▼                   ▼                    ▼                   │
//! │  Inbound task       Watchdog timer      Offset refresh           │
//! │  decode → limit     → ResyncRequest     → SyncTimer              │
//! │  → Worker                                                        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod chain;
pub mod config;
pub mod metrics;
pub mod network;
mod runner;
pub mod telemetry;
mod time_sync;
mod watchdog;

pub use chain::LocalChain;
pub use config::{DevnetConfig, DevnetConfigError};
pub use metrics::{render_metrics, PrometheusStatusSink};
pub use runner::{ProductionRunner, ProductionRunnerBuilder, RunnerError, ShutdownHandle};
pub use telemetry::{init_logging, TelemetryError};
pub use time_sync::{spawn_offset_refresh, FixedOffsetSource};
pub use watchdog::TokioWatchdog;
