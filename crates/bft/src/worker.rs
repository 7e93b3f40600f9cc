//! Inbound consensus message intake.
//!
//! The network-receive path calls [`Worker::receive`] concurrently with the
//! scheduler tick. Messages are authenticated and decoded outside the lock,
//! then placed in a round-scoped inbox that the scheduler drains for its
//! current round. The inbox is the only structure both paths touch.
//!
//! Buffering is bounded per sender: each sender gets at most one message of
//! each payload kind per round, and at most `inbox_capacity` messages per
//! round. One sender can never use up another sender's room.

use crate::error::InboundError;
use crate::{ConsensusConfig, EpochSnapshots};
use parking_lot::Mutex;
use spos_messages::{ConsensusMessage, Payload};
use spos_types::{Round, ShardId, ValidatorId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// An authenticated, decoded inbound message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub round: Round,
    pub sender: ValidatorId,
    pub payload: Payload,
}

/// A message whose envelope signature verified against the current epoch.
///
/// Produced by [`Worker::authenticate`], consumed by [`Worker::accept`].
#[derive(Debug)]
pub struct AuthenticatedMessage {
    message: ConsensusMessage,
}

impl AuthenticatedMessage {
    pub fn sender(&self) -> ValidatorId {
        self.message.sender
    }

    pub fn round(&self) -> Round {
        self.message.round
    }
}

#[derive(Debug, Default)]
struct RoundInbox {
    queue: Vec<InboundMessage>,
    /// Messages buffered per sender this round, drained ones included.
    per_sender: HashMap<ValidatorId, usize>,
    /// Payload kinds already accepted from each sender this round.
    seen: HashSet<(ValidatorId, &'static str)>,
}

#[derive(Debug, Default)]
struct Inbox {
    current: Round,
    rounds: BTreeMap<Round, RoundInbox>,
    /// Rejections since the last drain, by reason.
    dropped: HashMap<&'static str, u64>,
}

/// Receives and classifies inbound consensus messages.
pub struct Worker {
    shard: ShardId,
    self_id: ValidatorId,
    epochs: Arc<EpochSnapshots>,
    horizon: u64,
    capacity: usize,
    inbox: Mutex<Inbox>,
}

impl Worker {
    pub fn new(
        shard: ShardId,
        self_id: ValidatorId,
        epochs: Arc<EpochSnapshots>,
        config: &ConsensusConfig,
    ) -> Self {
        Self {
            shard,
            self_id,
            epochs,
            horizon: config.inbox_horizon,
            capacity: config.inbox_capacity,
            inbox: Mutex::new(Inbox::default()),
        }
    }

    pub fn self_id(&self) -> ValidatorId {
        self.self_id
    }

    /// Authenticate, decode and buffer an inbound message.
    ///
    /// Rejected messages never reach consensus state. Messages from this node
    /// itself are ignored.
    pub fn receive(&self, message: ConsensusMessage) -> Result<(), InboundError> {
        if message.sender == self.self_id {
            trace!(round = message.round.0, "Ignoring own message");
            return Ok(());
        }
        let message = self.authenticate(message)?;
        self.accept(message)
    }

    /// Check the round window, the sender's eligibility and the envelope
    /// signature.
    pub fn authenticate(
        &self,
        message: ConsensusMessage,
    ) -> Result<AuthenticatedMessage, InboundError> {
        let result = self.try_authenticate(message);
        if let Err(e) = &result {
            self.record_drop(e);
        }
        result
    }

    /// Decode and buffer a message that passed [`Worker::authenticate`].
    pub fn accept(&self, message: AuthenticatedMessage) -> Result<(), InboundError> {
        let result = self.try_accept(message.message);
        if let Err(e) = &result {
            self.record_drop(e);
        }
        result
    }

    fn record_drop(&self, error: &InboundError) {
        debug!(error = %error, "Inbound consensus message rejected");
        *self.inbox.lock().dropped.entry(error.reason()).or_default() += 1;
    }

    fn try_authenticate(
        &self,
        message: ConsensusMessage,
    ) -> Result<AuthenticatedMessage, InboundError> {
        let current = self.inbox.lock().current;
        self.check_window(message.round, current)?;

        let epoch = self.epochs.load();
        let public_key = epoch
            .validators()
            .public_key(message.sender)
            .ok_or(InboundError::UnknownSender(message.sender))?;
        if !message.verify(self.shard, public_key) {
            return Err(InboundError::InvalidSignature(message.sender));
        }
        Ok(AuthenticatedMessage { message })
    }

    fn try_accept(&self, message: ConsensusMessage) -> Result<(), InboundError> {
        if message.sender == self.self_id {
            trace!(round = message.round.0, "Ignoring own message");
            return Ok(());
        }
        let payload = message.decode_payload()?;
        let kind = payload.type_name();
        let (round, sender) = (message.round, message.sender);

        let mut inbox = self.inbox.lock();
        // The scheduler may have moved on while we were verifying.
        self.check_window(round, inbox.current)?;

        let slot = inbox.rounds.entry(round).or_default();
        if slot.seen.contains(&(sender, kind)) {
            return Err(InboundError::Duplicate { sender, kind });
        }
        let buffered = slot.per_sender.entry(sender).or_default();
        if *buffered >= self.capacity {
            return Err(InboundError::InboxFull { round, sender });
        }
        *buffered += 1;
        slot.seen.insert((sender, kind));
        trace!(
            round = round.0,
            sender = sender.0,
            kind,
            "Buffered consensus message"
        );
        slot.queue.push(InboundMessage {
            round,
            sender,
            payload,
        });
        Ok(())
    }

    fn check_window(&self, message_round: Round, current: Round) -> Result<(), InboundError> {
        if message_round < current {
            return Err(InboundError::StaleRound {
                message_round,
                current,
            });
        }
        if message_round.distance_from(current) > self.horizon {
            return Err(InboundError::BeyondHorizon {
                message_round,
                current,
            });
        }
        Ok(())
    }

    /// Move the inbox to `round`, discarding everything buffered for earlier rounds.
    ///
    /// Returns the number of discarded messages.
    pub fn advance_to(&self, round: Round) -> usize {
        let mut inbox = self.inbox.lock();
        if round < inbox.current {
            return 0;
        }
        inbox.current = round;
        let kept = inbox.rounds.split_off(&round);
        let discarded: usize = std::mem::replace(&mut inbox.rounds, kept)
            .values()
            .map(|slot| slot.queue.len())
            .sum();
        if discarded > 0 {
            debug!(round = round.0, discarded, "Discarded messages for past rounds");
        }
        discarded
    }

    /// Take every buffered message for `round`.
    ///
    /// Per-sender accounting for the round is kept, so a drained message
    /// cannot be replayed into the same round.
    pub fn drain(&self, round: Round) -> Vec<InboundMessage> {
        self.inbox
            .lock()
            .rounds
            .get_mut(&round)
            .map(|slot| std::mem::take(&mut slot.queue))
            .unwrap_or_default()
    }

    /// Number of messages buffered for `round`.
    pub fn pending(&self, round: Round) -> usize {
        self.inbox
            .lock()
            .rounds
            .get(&round)
            .map_or(0, |slot| slot.queue.len())
    }

    /// Round the inbox currently accepts from.
    pub fn current_round(&self) -> Round {
        self.inbox.lock().current
    }

    /// Take rejection counts accumulated since the last call.
    pub fn take_dropped(&self) -> HashMap<&'static str, u64> {
        std::mem::take(&mut self.inbox.lock().dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EpochState;
    use spos_messages::{BlockProposal, PartialSignature};
    use spos_test_helpers::{test_header, validator_set, TestValidators};
    use spos_types::{Epoch, Hash, QuorumThreshold};
    use tracing_test::traced_test;

    const SHARD: ShardId = ShardId(0);

    fn setup(config: &ConsensusConfig) -> (TestValidators, Worker) {
        let validators = validator_set(4);
        let epoch = EpochState::new(
            Epoch(0),
            validators.set.clone(),
            QuorumThreshold::SuperMajority,
            Hash::ZERO,
        )
        .unwrap();
        let worker = Worker::new(
            SHARD,
            ValidatorId(0),
            Arc::new(EpochSnapshots::new(epoch)),
            config,
        );
        (validators, worker)
    }

    fn signature_message(v: &TestValidators, sender: usize, round: u64) -> ConsensusMessage {
        let payload = Payload::from(PartialSignature::new(
            Hash::from_bytes(b"header"),
            v.keys[sender].sign(b"header"),
        ));
        ConsensusMessage::sign(
            SHARD,
            Round(round),
            ValidatorId(sender as u64),
            &payload,
            &v.keys[sender],
        )
        .unwrap()
    }

    #[traced_test]
    #[test]
    fn test_buffers_current_and_near_future() {
        let (v, worker) = setup(&ConsensusConfig::default());
        worker.advance_to(Round(5));

        worker.receive(signature_message(&v, 1, 5)).unwrap();
        worker.receive(signature_message(&v, 2, 7)).unwrap();
        assert_eq!(worker.pending(Round(5)), 1);
        assert_eq!(worker.pending(Round(7)), 1);

        let drained = worker.drain(Round(5));
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].sender, ValidatorId(1));
        assert_eq!(worker.pending(Round(5)), 0);
    }

    #[traced_test]
    #[test]
    fn test_rejects_stale_and_far_future() {
        let (v, worker) = setup(&ConsensusConfig::default());
        worker.advance_to(Round(5));

        assert_eq!(
            worker.receive(signature_message(&v, 1, 4)),
            Err(InboundError::StaleRound {
                message_round: Round(4),
                current: Round(5)
            })
        );
        assert_eq!(
            worker.receive(signature_message(&v, 1, 8)),
            Err(InboundError::BeyondHorizon {
                message_round: Round(8),
                current: Round(5)
            })
        );

        let dropped = worker.take_dropped();
        assert_eq!(dropped.get("stale_round"), Some(&1));
        assert_eq!(dropped.get("beyond_horizon"), Some(&1));
        assert!(worker.take_dropped().is_empty());
    }

    #[test]
    fn test_rejects_unknown_sender_and_forged_signature() {
        let (v, worker) = setup(&ConsensusConfig::default());

        let mut forged = signature_message(&v, 1, 0);
        forged.sender = ValidatorId(2);
        assert_eq!(
            worker.receive(forged),
            Err(InboundError::InvalidSignature(ValidatorId(2)))
        );

        let mut unknown = signature_message(&v, 1, 0);
        unknown.sender = ValidatorId(42);
        assert_eq!(
            worker.receive(unknown),
            Err(InboundError::UnknownSender(ValidatorId(42)))
        );
    }

    #[test]
    fn test_rejects_malformed_payload() {
        let (v, worker) = setup(&ConsensusConfig::default());
        // Envelope claims Signature subround but carries a block proposal.
        let header = test_header(SHARD, Epoch(0), Round(0), ValidatorId(1));
        let payload = Payload::from(BlockProposal::new(header));
        let mut message =
            ConsensusMessage::sign(SHARD, Round(0), ValidatorId(1), &payload, &v.keys[1]).unwrap();
        message.subround = spos_types::SubroundId::Signature;
        // Re-sign so only the payload check can fail.
        let bytes = spos_types::consensus_message_signing_bytes(
            SHARD,
            message.round,
            message.subround,
            message.sender,
            &message.payload,
        );
        message.signature = v.keys[1].sign(&bytes);

        assert!(matches!(
            worker.receive(message),
            Err(InboundError::Malformed(_))
        ));
    }

    fn proposal_message(v: &TestValidators, sender: usize, round: u64) -> ConsensusMessage {
        let header = test_header(SHARD, Epoch(0), Round(round), ValidatorId(sender as u64));
        let payload = Payload::from(BlockProposal::new(header));
        ConsensusMessage::sign(
            SHARD,
            Round(round),
            ValidatorId(sender as u64),
            &payload,
            &v.keys[sender],
        )
        .unwrap()
    }

    #[test]
    fn test_inbox_capacity_is_per_sender() {
        let config = ConsensusConfig {
            inbox_capacity: 1,
            ..ConsensusConfig::default()
        };
        let (v, worker) = setup(&config);

        worker.receive(signature_message(&v, 1, 0)).unwrap();
        assert_eq!(
            worker.receive(proposal_message(&v, 1, 0)),
            Err(InboundError::InboxFull {
                round: Round(0),
                sender: ValidatorId(1)
            })
        );
        worker.receive(signature_message(&v, 2, 0)).unwrap();
        worker.receive(proposal_message(&v, 3, 0)).unwrap();
        assert_eq!(worker.pending(Round(0)), 3);
    }

    #[test]
    fn test_second_message_of_a_kind_rejected() {
        let (v, worker) = setup(&ConsensusConfig::default());

        worker.receive(signature_message(&v, 1, 0)).unwrap();
        assert_eq!(
            worker.receive(signature_message(&v, 1, 0)),
            Err(InboundError::Duplicate {
                sender: ValidatorId(1),
                kind: "block.signature"
            })
        );

        // Draining does not reopen the round to replays.
        assert_eq!(worker.drain(Round(0)).len(), 1);
        assert!(matches!(
            worker.receive(signature_message(&v, 1, 0)),
            Err(InboundError::Duplicate { .. })
        ));

        // Other kinds and other rounds are unaffected.
        worker.receive(proposal_message(&v, 1, 0)).unwrap();
        worker.receive(signature_message(&v, 1, 1)).unwrap();
        assert_eq!(worker.take_dropped().get("duplicate"), Some(&2));
    }

    #[traced_test]
    #[test]
    fn test_flooding_sender_does_not_displace_others() {
        let config = ConsensusConfig {
            inbox_capacity: 4,
            ..ConsensusConfig::default()
        };
        let (v, worker) = setup(&config);

        for _ in 0..4 {
            let _ = worker.receive(signature_message(&v, 1, 0));
        }
        let mut forged = signature_message(&v, 1, 0);
        forged.sender = ValidatorId(3);
        assert!(worker.receive(forged).is_err());
        assert!(worker.receive(signature_message(&v, 1, 9)).is_err());

        worker.receive(signature_message(&v, 2, 0)).unwrap();
        worker.receive(signature_message(&v, 3, 0)).unwrap();

        let senders: Vec<ValidatorId> = worker
            .drain(Round(0))
            .into_iter()
            .map(|m| m.sender)
            .collect();
        assert_eq!(senders, vec![ValidatorId(1), ValidatorId(2), ValidatorId(3)]);

        let dropped = worker.take_dropped();
        assert_eq!(dropped.get("duplicate"), Some(&3));
        assert_eq!(dropped.get("invalid_signature"), Some(&1));
        assert_eq!(dropped.get("beyond_horizon"), Some(&1));
    }

    #[test]
    fn test_authenticate_then_accept() {
        let (v, worker) = setup(&ConsensusConfig::default());

        let message = worker.authenticate(signature_message(&v, 2, 0)).unwrap();
        assert_eq!(message.sender(), ValidatorId(2));
        assert_eq!(message.round(), Round(0));
        assert_eq!(worker.pending(Round(0)), 0);
        worker.accept(message).unwrap();
        assert_eq!(worker.pending(Round(0)), 1);

        let mut forged = signature_message(&v, 1, 0);
        forged.sender = ValidatorId(2);
        assert_eq!(
            worker.authenticate(forged).unwrap_err(),
            InboundError::InvalidSignature(ValidatorId(2))
        );
    }

    #[test]
    fn test_advance_discards_past_rounds() {
        let (v, worker) = setup(&ConsensusConfig::default());
        worker.receive(signature_message(&v, 1, 0)).unwrap();
        worker.receive(signature_message(&v, 1, 1)).unwrap();
        worker.receive(signature_message(&v, 1, 2)).unwrap();

        assert_eq!(worker.advance_to(Round(2)), 2);
        assert_eq!(worker.pending(Round(2)), 1);
        assert_eq!(worker.current_round(), Round(2));
    }

    #[test]
    fn test_own_messages_ignored() {
        let (v, worker) = setup(&ConsensusConfig::default());
        worker.receive(signature_message(&v, 0, 0)).unwrap();
        assert_eq!(worker.pending(Round(0)), 0);
    }
}
