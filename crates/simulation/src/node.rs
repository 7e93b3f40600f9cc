//! A simulated node.

use crate::chain::SimChain;
use crate::NodeIndex;
use spos_bft::Chronology;
use spos_clock::ManualWatchdog;
use spos_core::{Action, ResyncRequest};
use spos_types::ValidatorId;
use std::sync::Arc;
use std::time::Duration;

/// One node: its scheduler, watchdog and chain.
pub struct SimNode {
    index: NodeIndex,
    chronology: Chronology,
    watchdog: Arc<ManualWatchdog>,
    chain: Arc<SimChain>,
    resyncs: Vec<ResyncRequest>,
    stalled: bool,
}

impl SimNode {
    pub(crate) fn new(
        index: NodeIndex,
        chronology: Chronology,
        watchdog: Arc<ManualWatchdog>,
        chain: Arc<SimChain>,
    ) -> Self {
        Self {
            index,
            chronology,
            watchdog,
            chain,
            resyncs: Vec::new(),
            stalled: false,
        }
    }

    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn validator_id(&self) -> ValidatorId {
        self.chronology.self_id()
    }

    pub fn chronology(&self) -> &Chronology {
        &self.chronology
    }

    pub fn chain(&self) -> &SimChain {
        &self.chain
    }

    pub fn watchdog(&self) -> &ManualWatchdog {
        &self.watchdog
    }

    /// Resync requests handed to this node's recovery path.
    pub fn resync_requests(&self) -> &[ResyncRequest] {
        &self.resyncs
    }

    /// Whether the scheduler has been frozen.
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub(crate) fn stall(&mut self) {
        self.stalled = true;
    }

    pub(crate) fn resume(&mut self) {
        self.stalled = false;
    }

    pub(crate) fn tick(&mut self, now: Duration) -> Vec<Action> {
        if self.stalled {
            return Vec::new();
        }
        self.chronology.tick_at(now)
    }

    /// Poll the watchdog; a fired request goes to the recovery path.
    pub(crate) fn poll_watchdog(&mut self) -> Option<ResyncRequest> {
        let request = self.watchdog.poll()?;
        self.chronology.on_resync_requested(&request);
        self.resyncs.push(request);
        Some(request)
    }

    pub(crate) fn stop(&mut self) {
        self.chronology.stop();
    }
}
