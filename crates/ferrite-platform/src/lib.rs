//! Platform services shared by device models: deterministic virtual time, the
//! one-shot timer queue, the derived clock tree, and interrupt plumbing.
//!
//! Everything here is single-threaded by design: one logical actor (the guest
//! access path or a drained timer event) runs at a time, so no locking is
//! required anywhere.

#![forbid(unsafe_code)]

pub mod clock;
pub mod clock_tree;
pub mod irq;
pub mod timers;

pub use clock::{Clock, ManualClock};
pub use clock_tree::{ClockError, ClockId, ClockTree};
pub use irq::{InterruptMap, IrqSink};
pub use timers::{TimerId, TimerQueue};
