//! Joywire Hardware Abstraction Layer
//!
//! This crate defines the hardware capabilities the frame transceiver
//! consumes. Chip-specific HALs (currently RP2040) implement them, and the
//! board-agnostic transceiver in `joywire-core` is written against them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Application (joywire-firmware)         │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  joywire-core (codec, transceiver)      │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  joywire-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//!             ┌───────────────┐
//!             │ joywire-hal-  │
//!             │    rp2040     │
//!             └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`transport::BitTransport`] - fixed-function bit sampler/shifter
//! - [`dma::BulkChannel`] - one claimed bulk-transfer (DMA) channel

#![no_std]
#![deny(unsafe_code)]

pub mod dma;
pub mod transport;

// Re-export key traits at crate root for convenience
pub use dma::{BulkChannel, Direction, EngineError};
pub use transport::{BitTransport, ClockDivider, ShiftConfig, ShiftDirection, TransportConfig};
