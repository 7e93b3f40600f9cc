//! Network plumbing for the production runner.
//!
//! Gossip transport itself is external; this module defines the seam
//! ([`Transport`]), the wire codec, inbound rate limiting, and an in-process
//! transport for local networks.

pub mod codec;
mod inbound;
mod local;
pub mod rate_limiter;

pub use codec::{decode_message, encode_message, CodecError};
pub use inbound::{run_inbound, InboundFrameError, InboundHandler};
pub use local::LocalNetwork;
pub use rate_limiter::{RateLimitConfig, SenderRateLimiter};

use thiserror::Error;
use tokio::sync::broadcast;

/// A frame as carried by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    pub topic: String,
    pub data: Vec<u8>,
}

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("No peers subscribed")]
    NoPeers,

    #[error("Transport closed")]
    Closed,

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Gossip transport for consensus topics.
///
/// Publishing must not block the scheduler: implementations queue the frame
/// and return.
pub trait Transport: Send + Sync {
    /// Publish a frame to every peer subscribed to its topic.
    fn publish(&self, frame: WireFrame) -> Result<(), NetworkError>;

    /// Receive every frame published on the transport.
    fn subscribe(&self) -> broadcast::Receiver<WireFrame>;
}
