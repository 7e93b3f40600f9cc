//! Logging initialization.
//!
//! Installs a `tracing` subscriber with an env-filter and a fmt layer. The
//! state machines only emit events; this is the one place that decides where
//! they go.

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// Filter used when neither `RUST_LOG` nor an explicit level is given.
pub const DEFAULT_LOG_FILTER: &str = "info,spos=debug";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Failed to set global subscriber: {0}")]
    SetSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Build the env-filter: `RUST_LOG` wins, then `level`, then [`DEFAULT_LOG_FILTER`].
pub fn log_filter(level: Option<&str>) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    Ok(EnvFilter::try_new(level.unwrap_or(DEFAULT_LOG_FILTER))?)
}

/// Install the global subscriber.
pub fn init_logging(level: Option<&str>) -> Result<(), TelemetryError> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true);

    let subscriber = Registry::default().with(log_filter(level)?).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
