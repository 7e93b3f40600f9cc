//! Time-keeping primitives for the round scheduler.
//!
//! - [`RoundHandler`]: maps time to a round index and an offset within the round
//! - [`SyncTimer`]: local clock corrected by an offset against a reference clock
//! - [`Watchdog`]: liveness deadline raising a [`ResyncRequest`](spos_core::ResyncRequest)
//! - [`SystemClock`] / [`ManualClock`]: raw time sources
//!
//! All times are durations since the Unix epoch.

mod round_handler;
mod sync_timer;
mod time;
mod watchdog;

pub use round_handler::{RoundError, RoundHandler, RoundHandlerBuilder};
pub use sync_timer::{OffsetError, OffsetSource, SyncTimer};
pub use time::{ManualClock, SystemClock};
pub use watchdog::{DisabledWatchdog, ManualWatchdog, Watchdog};
