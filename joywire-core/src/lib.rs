//! Board-agnostic core logic for the Joybus frame transceiver
//!
//! This crate contains everything that does not touch chip registers:
//!
//! - Frame type and the frame codec (word stream encoding, majority-vote
//!   decoding of oversampled line samples)
//! - Completion signal shared between interrupt context and the transceiver
//! - Transfer orchestration (`send`, `receive`, `exchange`) with bounded waits
//! - Configuration type definitions
//!
//! Hardware is reached only through the traits in `joywire-hal`.

#![no_std]
#![deny(unsafe_code)]

// Must stay first so the logging macros are visible to the other modules
mod fmt;

pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod signal;
pub mod transceiver;

pub use codec::{CodecError, RxPacking};
pub use config::{BusConfig, LoopbackConfig, TimingConfig, TransceiverConfig, TransferMode};
pub use error::{ExchangeError, RxError, TxError};
pub use frame::{Frame, DMA_MAX_FRAME_BYTES, FIFO_MAX_FRAME_BYTES, MAX_FRAME_CAPACITY};
pub use signal::{CompletionSignal, CompletionStatus, Completions};
pub use transceiver::{Diagnostics, Port, RxState, TransferBuffers, Transceiver, TxState};
