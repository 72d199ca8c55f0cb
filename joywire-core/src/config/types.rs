//! Transceiver configuration
//!
//! These types select how frames move between memory and the bit-level
//! transport. They are fixed per deployment, never negotiated at runtime.

use crate::codec::RxPacking;
use crate::frame::{DMA_MAX_FRAME_BYTES, FIFO_MAX_FRAME_BYTES};

/// How words reach the transport FIFOs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferMode {
    /// Bulk transfers with interrupt-driven completion
    #[default]
    Dma,
    /// Direct FIFO pushes and pulls by the CPU (degraded fallback)
    Fifo,
}

impl TransferMode {
    /// Longest frame this mode can carry
    pub const fn max_frame_bytes(self) -> usize {
        match self {
            TransferMode::Dma => DMA_MAX_FRAME_BYTES,
            TransferMode::Fifo => FIFO_MAX_FRAME_BYTES,
        }
    }
}

/// Transceiver behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransceiverConfig {
    /// Transfer path
    pub mode: TransferMode,
    /// Receive word layout
    pub rx_packing: RxPacking,
    /// Upper bound on short hardware waits (bus turn, FIFO space)
    pub bus_turn_timeout_us: u32,
    /// Sleep between polls of hardware flags
    pub poll_interval_us: u32,
}

impl Default for TransceiverConfig {
    fn default() -> Self {
        Self {
            mode: TransferMode::Dma,
            rx_packing: RxPacking::OneBytePerWord,
            bus_turn_timeout_us: 2_000,
            poll_interval_us: 2,
        }
    }
}

impl TransceiverConfig {
    /// Longest frame accepted by `send` and `receive`
    pub const fn max_frame_bytes(&self) -> usize {
        self.mode.max_frame_bytes()
    }

    /// Polling step, never zero
    pub fn poll_step_us(&self) -> u32 {
        self.poll_interval_us.max(1)
    }
}
