//! In-process transport.
//!
//! Every endpoint publishes to and receives from one tokio broadcast channel.
//! Used by the devnet binary to run a whole validator set in one process.

use super::{NetworkError, Transport, WireFrame};
use tokio::sync::broadcast;
use tracing::trace;

/// Shared in-memory gossip bus.
#[derive(Debug, Clone)]
pub struct LocalNetwork {
    tx: broadcast::Sender<WireFrame>,
}

impl LocalNetwork {
    /// A bus buffering up to `capacity` frames per slow receiver.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Number of connected endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Transport for LocalNetwork {
    fn publish(&self, frame: WireFrame) -> Result<(), NetworkError> {
        let topic_len = frame.topic.len();
        let bytes = frame.data.len();
        let delivered = self.tx.send(frame).map_err(|_| NetworkError::NoPeers)?;
        trace!(delivered, bytes, topic_len, "Published frame");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<WireFrame> {
        self.tx.subscribe()
    }
}
