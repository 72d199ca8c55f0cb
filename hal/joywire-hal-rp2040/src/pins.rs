//! Board pin assignment
//!
//! The Joybus line is split over two GPIOs: the transmit state machine
//! drives one, the receive state machine samples the other. On the bench
//! they are wired together (loopback); on a real bus both connect to the
//! data line, which needs a pull-up.

use embassy_rp::peripherals::{
    DMA_CH0, DMA_CH1, PIN_15, PIN_16, PIN_25, PIN_26, PIO0, PIO1,
};
use embassy_rp::{Peri, Peripherals};

/// Transmit pin (PIO0)
pub const TX_PIN: u8 = 15;

/// Receive pin (PIO1)
pub const RX_PIN: u8 = 16;

/// Onboard LED (Raspberry Pi Pico)
pub const LED_PIN: u8 = 25;

/// Button that reboots into the USB bootloader, active low
pub const BOOTSEL_PIN: u8 = 26;

/// Peripherals the bus and its support tasks use
pub struct BusPeripherals {
    pub tx_pin: Peri<'static, PIN_15>,
    pub rx_pin: Peri<'static, PIN_16>,
    pub led: Peri<'static, PIN_25>,
    pub bootsel: Peri<'static, PIN_26>,
    pub pio_tx: Peri<'static, PIO0>,
    pub pio_rx: Peri<'static, PIO1>,
    pub dma_tx: Peri<'static, DMA_CH0>,
    pub dma_rx: Peri<'static, DMA_CH1>,
}

impl BusPeripherals {
    /// Take the bus peripherals out of the embassy peripheral set
    pub fn from_peripherals(p: Peripherals) -> Self {
        Self {
            tx_pin: p.PIN_15,
            rx_pin: p.PIN_16,
            led: p.PIN_25,
            bootsel: p.PIN_26,
            pio_tx: p.PIO0,
            pio_rx: p.PIO1,
            dma_tx: p.DMA_CH0,
            dma_rx: p.DMA_CH1,
        }
    }
}
