//! Joybus bit timing on the RP2040 PIO blocks
//!
//! Both programs run from a 4MHz PIO clock, so one 4µs Joybus bit cell is
//! 16 PIO cycles. The line is open drain: the transmit program pulls it low
//! by switching the pin to output (with output level 0) and releases it by
//! switching back to input, letting the pull-up bring it high.
//!
//! ```text
//! bit 0:  3µs low, 1µs released
//! bit 1:  1µs low, 3µs released
//! stop:   1µs low, then released
//! ```
//!
//! The receive program waits for each falling edge and samples the line
//! three times around the cell centre (cycles 6, 8 and 10), so a clean
//! bit yields `000` or `111`.

use embassy_rp::pac;
use embassy_rp::peripherals::{PIO0, PIO1};
use embassy_rp::pio::{Instance, ShiftConfig, ShiftDirection};
use fixed::types::U24F8;
use joywire_hal::{ClockDivider, Direction};

/// System clock frequency (RP2040 default)
pub const SYS_CLK_HZ: u32 = 125_000_000;

/// PIO cycles per Joybus bit cell
pub const CYCLES_PER_BIT: u32 = 16;

/// A PIO block whose registers can be reached directly
///
/// Needed for the program counter and the FIFO addresses the DMA
/// channels target, which the PIO driver does not expose.
pub trait PioBlock: Instance {
    /// Block number (0 or 1)
    const INDEX: u8;

    /// Register block
    fn regs() -> pac::pio::Pio;
}

impl PioBlock for PIO0 {
    const INDEX: u8 = 0;

    fn regs() -> pac::pio::Pio {
        pac::PIO0
    }
}

impl PioBlock for PIO1 {
    const INDEX: u8 = 1;

    fn regs() -> pac::pio::Pio {
        pac::PIO1
    }
}

/// Convert a 16.8 divider into the PIO driver's fixed-point type
pub fn clock_divider(divider: ClockDivider) -> U24F8 {
    U24F8::from_bits(divider.to_bits())
}

/// Convert a shift register setup into the PIO driver's type
pub fn shift_config(config: joywire_hal::ShiftConfig) -> ShiftConfig {
    ShiftConfig {
        threshold: config.threshold,
        direction: match config.direction {
            joywire_hal::ShiftDirection::Left => ShiftDirection::Left,
            joywire_hal::ShiftDirection::Right => ShiftDirection::Right,
        },
        auto_fill: config.auto,
    }
}

/// DMA request line of a state machine FIFO
///
/// PIO0 TX0..3 are 0..3, PIO0 RX0..3 are 4..7, PIO1 follows at 8.
pub fn dreq(block: u8, sm: usize, direction: Direction) -> u8 {
    let rx_offset = match direction {
        Direction::Tx => 0,
        Direction::Rx => 4,
    };
    block * 8 + rx_offset + sm as u8
}
