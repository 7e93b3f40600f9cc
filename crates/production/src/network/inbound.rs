//! Inbound frame handling.
//!
//! Runs on its own task, concurrently with the scheduler. Frames are decoded
//! and authenticated by the [`Worker`]. Only then is the sender's own bucket
//! charged. Frames that cannot be attributed to an eligible validator charge
//! one shared bucket, and senders outside the epoch are charged before any
//! signature check.

use super::codec::{decode_message, CodecError};
use super::rate_limiter::{RateLimitConfig, SenderRateLimiter};
use super::WireFrame;
use parking_lot::Mutex;
use spos_bft::{EpochSnapshots, InboundError, Worker};
use spos_types::{ShardId, ValidatorId};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Why an inbound frame was not delivered to the worker.
#[derive(Debug, Error)]
pub enum InboundFrameError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Rate limited: {0}")]
    RateLimited(ValidatorId),

    #[error(transparent)]
    Rejected(#[from] InboundError),
}

/// Decodes, rate limits and delivers inbound frames.
pub struct InboundHandler {
    shard: ShardId,
    worker: Arc<Worker>,
    epochs: Arc<EpochSnapshots>,
    limiter: Mutex<SenderRateLimiter>,
}

impl InboundHandler {
    pub fn new(
        shard: ShardId,
        worker: Arc<Worker>,
        epochs: Arc<EpochSnapshots>,
        rate_limit: RateLimitConfig,
    ) -> Self {
        Self {
            shard,
            worker,
            epochs,
            limiter: Mutex::new(SenderRateLimiter::new(rate_limit)),
        }
    }

    /// Deliver one frame to the worker.
    pub fn handle(&self, frame: &WireFrame) -> Result<(), InboundFrameError> {
        let message = decode_message(self.shard, &frame.topic, &frame.data)?;
        let sender = message.sender;
        if sender == self.worker.self_id() {
            return Ok(());
        }

        if !self.epochs.load().validators().contains(sender) {
            if !self.limiter.lock().check_unverified() {
                return Err(InboundFrameError::RateLimited(sender));
            }
            self.worker.receive(message)?;
            return Ok(());
        }

        match self.worker.authenticate(message) {
            Ok(message) => {
                if !self.limiter.lock().check_verified(sender) {
                    return Err(InboundFrameError::RateLimited(sender));
                }
                self.worker.accept(message)?;
                Ok(())
            }
            Err(e) => {
                if !self.limiter.lock().check_unverified() {
                    return Err(InboundFrameError::RateLimited(sender));
                }
                Err(e.into())
            }
        }
    }
}

/// Feed frames from `rx` into `handler` until the transport closes.
pub async fn run_inbound(handler: Arc<InboundHandler>, mut rx: broadcast::Receiver<WireFrame>) {
    loop {
        match rx.recv().await {
            Ok(frame) => {
                if let Err(e) = handler.handle(&frame) {
                    debug!(error = %e, topic = %frame.topic, "Inbound frame dropped");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Inbound receiver lagged; frames lost");
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("Transport closed; inbound task exiting");
                return;
            }
        }
    }
}
