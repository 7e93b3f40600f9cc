//! Prometheus status sink.
//!
//! Maps the scheduler's status keys onto native Prometheus metrics: integer
//! keys become gauges or counters, string keys become a labelled gauge with
//! exactly one label value set to 1.

use prometheus::{Encoder, IntCounter, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use spos_core::{keys, StatusSink};
use spos_types::ValidatorId;
use std::collections::HashMap;
use tracing::trace;

const GAUGES: &[(&str, &str)] = &[
    (keys::CURRENT_ROUND, "Current round index"),
    (keys::CURRENT_SUBROUND, "Index of the current subround"),
    (keys::CURRENT_EPOCH, "Current epoch"),
    (keys::IS_LEADER, "1 if this node leads the current round"),
    (keys::LAST_FINALIZED_ROUND, "Last finalized round"),
];

const COUNTERS: &[(&str, &str)] = &[
    (keys::ROUNDS_FINALIZED, "Rounds finalized"),
    (keys::ROUNDS_ABANDONED, "Rounds abandoned"),
    (keys::SUBROUND_FAILURES, "Subrounds that missed their deadline"),
    (keys::ROUNDS_LED, "Rounds this node led"),
    (keys::MESSAGES_DROPPED, "Inbound messages rejected"),
    (keys::RESYNC_REQUESTS, "Resync requests raised by the watchdog"),
];

const LABELLED: &[(&str, &str, &str)] = &[
    (keys::CURRENT_SUBROUND_NAME, "Current subround", "subround"),
    (keys::CONSENSUS_STATE, "Consensus state of the current round", "state"),
];

/// Status sink publishing to a Prometheus registry.
///
/// Every metric carries a constant `validator` label so several nodes can
/// share one registry.
pub struct PrometheusStatusSink {
    gauges: HashMap<&'static str, IntGauge>,
    counters: HashMap<&'static str, IntCounter>,
    labelled: HashMap<&'static str, IntGaugeVec>,
}

impl PrometheusStatusSink {
    /// Register this node's metrics in `registry`.
    pub fn register(registry: &Registry, validator: ValidatorId) -> Result<Self, prometheus::Error> {
        let opts = |name: &str, help: &str| {
            Opts::new(name, help).const_label("validator", validator.0.to_string())
        };

        let mut gauges = HashMap::new();
        for (name, help) in GAUGES {
            let gauge = IntGauge::with_opts(opts(*name, *help))?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.insert(*name, gauge);
        }

        let mut counters = HashMap::new();
        for (name, help) in COUNTERS {
            let counter = IntCounter::with_opts(opts(format!("{name}_total").as_str(), *help))?;
            registry.register(Box::new(counter.clone()))?;
            counters.insert(*name, counter);
        }

        let mut labelled = HashMap::new();
        for (name, help, label) in LABELLED {
            let vec = IntGaugeVec::new(opts(*name, *help), &[*label])?;
            registry.register(Box::new(vec.clone()))?;
            labelled.insert(*name, vec);
        }

        Ok(Self {
            gauges,
            counters,
            labelled,
        })
    }
}

impl StatusSink for PrometheusStatusSink {
    fn set_u64(&self, key: &'static str, value: u64) {
        match self.gauges.get(key) {
            Some(gauge) => gauge.set(i64::try_from(value).unwrap_or(i64::MAX)),
            None => trace!(key, "No gauge for status key"),
        }
    }

    fn set_str(&self, key: &'static str, value: &str) {
        match self.labelled.get(key) {
            Some(vec) => {
                vec.reset();
                vec.with_label_values(&[value]).set(1);
            }
            None => trace!(key, "No labelled gauge for status key"),
        }
    }

    fn increment(&self, key: &'static str) {
        match self.counters.get(key) {
            Some(counter) => counter.inc(),
            None => trace!(key, "No counter for status key"),
        }
    }
}

/// Render `registry` in the Prometheus text exposition format.
pub fn render_metrics(registry: &Registry) -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
