//! Bus timing and self-test configuration

use super::types::TransceiverConfig;

/// Bit-level transport clock: 4MHz gives 4 cycles per microsecond
pub const DEFAULT_PIO_CLOCK_HZ: u32 = 4_000_000;

/// Timing of the bit-level transports and caller-facing deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingConfig {
    /// Transport clock after division
    pub pio_clock_hz: u32,
    /// Delay between enabling the receiver and the transmitter at startup
    pub rx_settle_ms: u32,
    /// Deadline for a send to complete
    pub tx_timeout_us: u32,
    /// Deadline for a receive to complete after its send
    pub rx_timeout_us: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pio_clock_hz: DEFAULT_PIO_CLOCK_HZ,
            rx_settle_ms: 200,
            tx_timeout_us: 1_000,
            // 16 bytes at 4us per bit plus stop bit and margin
            rx_timeout_us: 1_000,
        }
    }
}

/// Loopback self-test (TX pin wired to RX pin)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopbackConfig {
    /// Run the self-test task
    pub enabled: bool,
    /// Pause between passes over the test frames
    pub interval_ms: u32,
    /// Pause between two frames of one pass
    pub inter_frame_ms: u32,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5_000,
            inter_frame_ms: 10,
        }
    }
}

/// Complete bus configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusConfig {
    /// Config format version
    pub version: u8,
    /// Transceiver behavior
    pub transceiver: TransceiverConfig,
    /// Clocks and deadlines
    pub timing: TimingConfig,
    /// Self-test
    pub loopback: LoopbackConfig,
}

impl BusConfig {
    /// Create a default configuration
    pub fn new() -> Self {
        Self {
            version: 1,
            ..Default::default()
        }
    }
}
