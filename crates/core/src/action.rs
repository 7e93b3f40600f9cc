//! Actions emitted by the round scheduler.

use crate::OutboundMessage;
use spos_messages::FinalizedBlock;

/// Actions the scheduler asks the runner to perform.
///
/// The scheduler never performs I/O itself. Each tick returns the actions
/// produced by the subround jobs that ran, and the runner executes them in
/// order.
#[derive(Debug, Clone)]
pub enum Action {
    /// Broadcast a message on the shard's consensus topic.
    Broadcast { message: OutboundMessage },

    /// Hand a finalized header to the block-commit collaborator.
    CommitBlock { block: FinalizedBlock },
}

impl Action {
    /// Get a human-readable name for this action type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Broadcast { message } => message.type_name(),
            Action::CommitBlock { .. } => "CommitBlock",
        }
    }
}
