//! Network messages for the consensus protocol.
//!
//! Every consensus message travels inside a [`ConsensusMessage`] envelope
//! carrying its round, subround, sender and a signature over the encoded
//! payload. The payload itself is one of the typed [`Payload`] variants.

mod envelope;
pub mod payload;

pub use envelope::{ConsensusMessage, MessageError, MAX_PAYLOAD_BYTES};
pub use payload::{BlockProposal, FinalizedBlock, PartialSignature, Payload};
