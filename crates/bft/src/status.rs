//! Status reporting for the round scheduler.

use spos_core::{keys, ConsensusOutcome, StatusSink, StatusUpdate};
use std::sync::Arc;
use tracing::trace;

/// Translates scheduler transitions into key/value status updates.
///
/// Read-only observer: nothing it does feeds back into consensus.
#[derive(Clone)]
pub struct StatusReporter {
    sink: Arc<dyn StatusSink>,
}

impl StatusReporter {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self { sink }
    }

    /// Publish one transition.
    pub fn report(&self, update: &StatusUpdate) {
        trace!(?update, "Status update");
        let sink = self.sink.as_ref();

        match update {
            StatusUpdate::RoundStarted {
                round,
                epoch,
                is_leader,
                ..
            } => {
                sink.set_u64(keys::CURRENT_ROUND, round.0);
                sink.set_u64(keys::CURRENT_EPOCH, epoch.0);
                sink.set_u64(keys::IS_LEADER, u64::from(*is_leader));
                sink.set_str(keys::CONSENSUS_STATE, ConsensusOutcome::InProgress.name());
                if *is_leader {
                    sink.increment(keys::ROUNDS_LED);
                }
            }
            StatusUpdate::SubroundEntered { subround, .. } => {
                sink.set_u64(keys::CURRENT_SUBROUND, subround.index() as u64);
                sink.set_str(keys::CURRENT_SUBROUND_NAME, subround.name());
            }
            StatusUpdate::SubroundFailed { .. } => {
                sink.increment(keys::SUBROUND_FAILURES);
            }
            StatusUpdate::RoundFinalized { round, .. } => {
                sink.set_str(keys::CONSENSUS_STATE, ConsensusOutcome::Finalized.name());
                sink.set_u64(keys::LAST_FINALIZED_ROUND, round.0);
                sink.increment(keys::ROUNDS_FINALIZED);
            }
            StatusUpdate::RoundAbandoned { .. } => {
                sink.set_str(keys::CONSENSUS_STATE, ConsensusOutcome::Abandoned.name());
                sink.increment(keys::ROUNDS_ABANDONED);
            }
            StatusUpdate::MessageDropped { .. } => {
                sink.increment(keys::MESSAGES_DROPPED);
            }
            StatusUpdate::ResyncRequested { .. } => {
                sink.increment(keys::RESYNC_REQUESTS);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use spos_types::{Epoch, Hash, Round, SubroundId, ValidatorId};
    use std::collections::HashMap;

    #[derive(Default)]
    struct RecordingSink {
        ints: Mutex<HashMap<&'static str, u64>>,
        strings: Mutex<HashMap<&'static str, String>>,
    }

    impl StatusSink for RecordingSink {
        fn set_u64(&self, key: &'static str, value: u64) {
            self.ints.lock().insert(key, value);
        }

        fn set_str(&self, key: &'static str, value: &str) {
            self.strings.lock().insert(key, value.to_string());
        }

        fn increment(&self, key: &'static str) {
            *self.ints.lock().entry(key).or_default() += 1;
        }
    }

    #[test]
    fn test_round_lifecycle_updates() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = StatusReporter::new(sink.clone());

        reporter.report(&StatusUpdate::RoundStarted {
            round: Round(7),
            epoch: Epoch(1),
            leader: ValidatorId(0),
            is_leader: true,
        });
        reporter.report(&StatusUpdate::SubroundEntered {
            round: Round(7),
            subround: SubroundId::Signature,
        });
        reporter.report(&StatusUpdate::RoundFinalized {
            round: Round(7),
            header_hash: Hash::ZERO,
            signers: 3,
            voting_power: 3,
        });

        let ints = sink.ints.lock();
        assert_eq!(ints[keys::CURRENT_ROUND], 7);
        assert_eq!(ints[keys::CURRENT_SUBROUND], 2);
        assert_eq!(ints[keys::ROUNDS_LED], 1);
        assert_eq!(ints[keys::ROUNDS_FINALIZED], 1);
        assert_eq!(ints[keys::LAST_FINALIZED_ROUND], 7);
        assert_eq!(sink.strings.lock()[keys::CONSENSUS_STATE], "finalized");
        assert_eq!(sink.strings.lock()[keys::CURRENT_SUBROUND_NAME], "signature");
    }

    #[test]
    fn test_failures_are_counted() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = StatusReporter::new(sink.clone());

        for _ in 0..3 {
            reporter.report(&StatusUpdate::MessageDropped {
                round: Round(1),
                reason: "stale_round",
            });
        }
        reporter.report(&StatusUpdate::RoundAbandoned {
            round: Round(1),
            reason: "no quorum",
        });

        assert_eq!(sink.ints.lock()[keys::MESSAGES_DROPPED], 3);
        assert_eq!(sink.ints.lock()[keys::ROUNDS_ABANDONED], 1);
        assert_eq!(sink.strings.lock()[keys::CONSENSUS_STATE], "abandoned");
    }
}
