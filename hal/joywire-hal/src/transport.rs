//! Bit-level transport abstractions
//!
//! The bit-level transport is a fixed-function state machine that shifts
//! or samples bits at a configured clock rate, independently of the CPU.
//! It is configured once at startup and afterwards only started, stopped,
//! fed and drained. Its instruction sequence is not part of this trait.

/// Interrupt flag the transmit program waits on before shifting a frame
pub const START_IRQ: u8 = 0;

/// Interrupt flag the transmit program raises once the line is released
///
/// This is the bus-turn token: set by hardware after a frame and its stop
/// bit have fully drained, cleared by the transceiver before the next send.
pub const BUS_TURN_IRQ: u8 = 1;

/// Shift register direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShiftDirection {
    /// Most-significant bit first
    Left,
    /// Least-significant bit first
    Right,
}

/// Shift register configuration for one side (out or in)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ShiftConfig {
    /// Shift direction
    pub direction: ShiftDirection,
    /// Autopull (out side) or autopush (in side)
    pub auto: bool,
    /// Number of bits after which the automatic pull/push happens (1-32)
    pub threshold: u8,
}

impl ShiftConfig {
    /// Transmit side: whole 32-bit words pulled automatically, MSB first
    pub const fn transmit() -> Self {
        Self {
            direction: ShiftDirection::Left,
            auto: true,
            threshold: 32,
        }
    }

    /// Receive side: 3 samples x 8 bits pushed automatically, oldest first
    pub const fn receive() -> Self {
        Self {
            direction: ShiftDirection::Left,
            auto: true,
            threshold: 24,
        }
    }
}

/// Fractional clock divider (16.8 fixed point)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockDivider {
    /// Integer part
    pub int: u16,
    /// Fractional part in 1/256 units
    pub frac: u8,
}

impl ClockDivider {
    /// Divider that runs the transport at `target_hz` from a `source_hz` clock
    ///
    /// Clamped to the 1.0..=65535.996 range the hardware accepts.
    pub fn from_frequencies(source_hz: u32, target_hz: u32) -> Self {
        if target_hz == 0 {
            return Self {
                int: 0xFFFF,
                frac: 0xFF,
            };
        }

        // Multiply by 256 first to keep 8 fractional bits
        let div_x256 = (source_hz as u64 * 256) / target_hz as u64;
        let div_x256 = div_x256.clamp(256, 0xFFFF_FF);

        Self {
            int: (div_x256 >> 8) as u16,
            frac: (div_x256 & 0xFF) as u8,
        }
    }

    /// Divider as raw 24.8 fixed-point bits
    pub fn to_bits(self) -> u32 {
        ((self.int as u32) << 8) | self.frac as u32
    }
}

/// One-time transport configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportConfig {
    /// GPIO the program drives (transmit) or samples (receive)
    pub pin: u8,
    /// Output shift register setup
    pub shift_out: ShiftConfig,
    /// Input shift register setup
    pub shift_in: ShiftConfig,
    /// Clock divider from the system clock
    pub clock_divider: ClockDivider,
}

/// Bit-level transport (one state machine)
///
/// Implementations own the hardware state machine. Words moved by a
/// [`crate::dma::BulkChannel`] bypass these methods entirely.
pub trait BitTransport {
    /// Enable the state machine
    fn start(&mut self);

    /// Disable the state machine
    fn stop(&mut self);

    /// Stop, drop any FIFO contents and restart at the program entry
    fn reset(&mut self);

    /// Pulse the start notification that tells the program a frame is ready
    fn force_start_notification(&mut self);

    /// Current program counter (diagnostics only)
    fn program_counter(&self) -> u8;

    /// Check an interrupt flag of the transport's block
    fn interrupt_flag(&self, index: u8) -> bool;

    /// Clear an interrupt flag of the transport's block
    fn clear_interrupt_flag(&mut self, index: u8);

    /// Push one word into the transmit FIFO
    ///
    /// Returns `false` if the FIFO is full.
    fn try_push(&mut self, word: u32) -> bool;

    /// Pull one word from the receive FIFO, if any
    fn try_pull(&mut self) -> Option<u32>;
}
