//! Deterministic simulation runner.
//!
//! Runs several SPOS nodes in one thread against a shared manual clock. The
//! clock advances in fixed steps; messages travel through a simulated network
//! with seeded latency, loss and partitions. Given the same seed, every run
//! produces identical results.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SimulationRunner                       │
//! │                                                         │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Delivery queue (BTreeMap<(time, seq), msg>)    │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │ due messages → Worker       │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     nodes: Vec<SimNode>                            │ │
//! │  │     Chronology::tick_at(now) per step              │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Actions → schedule deliveries / commit         │ │
//! │  │     ManualWatchdog::poll → resync requests         │ │
//! │  └────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod chain;
mod network;
mod node;
mod runner;

pub use chain::SimChain;
pub use network::{NetworkConfig, SimulatedNetwork};
pub use node::SimNode;
pub use runner::{SimulationConfig, SimulationRunner, SimulationStats};

/// Type alias for deterministic node indexing in simulation.
///
/// Only used for routing between in-process nodes; consensus itself only
/// knows `ValidatorId`s.
pub type NodeIndex = u32;
