//! Embassy async tasks
//!
//! Each task runs independently; the loopback task owns the transceiver.

pub mod bootsel;
pub mod loopback;

pub use bootsel::bootsel_task;
pub use loopback::{loopback_task, BusTransceiver, LOOPBACK_FAILURES, LOOPBACK_PASSES};
