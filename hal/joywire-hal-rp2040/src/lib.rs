//! RP2040-specific HAL for the Joybus frame transceiver
//!
//! This crate provides RP2040 implementations of the `joywire-hal` traits:
//!
//! - PIO programs for Joybus bit timing (transmit and 3x oversampling receive)
//! - [`transport::PioTransport`] wrapping one PIO state machine
//! - [`dma::DmaChannel`] driving FIFO transfers with completion on `DMA_IRQ_1`
//! - Board pin assignment and peripheral split

#![no_std]

pub mod dma;
pub mod pins;
pub mod pio;
pub mod transport;

pub use dma::{on_dma_irq, DmaChannel};
pub use transport::{FifoEndpoint, PioTransport};
