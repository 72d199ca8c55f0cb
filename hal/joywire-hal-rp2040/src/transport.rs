//! PIO state machine transports
//!
//! One [`PioTransport`] owns one state machine, its block's interrupt flags
//! and the bus pin it drives or samples. The transmit and receive programs
//! live on separate PIO blocks so each transport owns its block's flags.

use embassy_rp::gpio::{Level, Pull};
use embassy_rp::pio::{
    Common, Config, Direction as PioDirection, IrqFlags, Pin, PioPin, StateMachine,
};
use embassy_rp::Peri;
use joywire_hal::transport::{BitTransport, TransportConfig};
use joywire_hal::Direction;

use crate::pio::{clock_divider, dreq, shift_config, PioBlock};

/// FIFO address and pacing signal a DMA channel is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FifoEndpoint {
    /// Bus address of the FIFO register
    pub addr: u32,
    /// DMA request line
    pub dreq: u8,
    /// Memory-to-FIFO or FIFO-to-memory
    pub direction: Direction,
}

/// One PIO state machine running a Joybus program
pub struct PioTransport<'d, PIO: PioBlock, const SM: usize> {
    sm: StateMachine<'d, PIO, SM>,
    irq_flags: IrqFlags<'d, PIO>,
    pin: Pin<'d, PIO>,
    origin: u8,
    running: bool,
}

impl<'d, PIO: PioBlock, const SM: usize> PioTransport<'d, PIO, SM> {
    /// Load the transmit program and configure the state machine
    ///
    /// The state machine is left disabled with the line released.
    pub fn new_tx(
        common: &mut Common<'d, PIO>,
        mut sm: StateMachine<'d, PIO, SM>,
        irq_flags: IrqFlags<'d, PIO>,
        pin: Peri<'d, impl PioPin>,
        config: &TransportConfig,
    ) -> Self {
        let prg = pio::pio_asm!(
            // Bus turn token is set once after reset
            "irq 1",
            ".wrap_target",
            "wait 1 irq 0",
            "out x, 32",
            "bitloop:",
            "set pindirs, 1 [1]",
            "out y, 1",
            "jmp !y bit_zero",
            "set pindirs, 0 [10]",
            "jmp x-- bitloop",
            "jmp stop",
            "bit_zero:",
            "nop [7]",
            "set pindirs, 0 [2]",
            "jmp x-- bitloop",
            "stop:",
            "set pindirs, 1 [3]",
            "set pindirs, 0",
            // Drop the padding of the last word
            "mov osr, null",
            "out null, 32",
            "irq 1",
            ".wrap"
        );

        let installed = common.load_program(&prg.program);
        let mut line = common.make_pio_pin(pin);
        line.set_pull(Pull::Up);

        let mut cfg = Config::default();
        cfg.use_program(&installed, &[]);
        cfg.set_set_pins(&[&line]);
        cfg.shift_out = shift_config(config.shift_out);
        cfg.shift_in = shift_config(config.shift_in);
        cfg.clock_divider = clock_divider(config.clock_divider);

        sm.set_config(&cfg);
        // Output latch low, direction input: the line floats high
        sm.set_pins(Level::Low, &[&line]);
        sm.set_pin_dirs(PioDirection::In, &[&line]);

        Self {
            sm,
            irq_flags,
            pin: line,
            origin: installed.origin,
            running: false,
        }
    }

    /// Load the 3x oversampling receive program and configure the state machine
    ///
    /// The state machine is left disabled. It expects `bits - 1` in its TX
    /// FIFO before each frame.
    pub fn new_rx(
        common: &mut Common<'d, PIO>,
        mut sm: StateMachine<'d, PIO, SM>,
        irq_flags: IrqFlags<'d, PIO>,
        pin: Peri<'d, impl PioPin>,
        config: &TransportConfig,
    ) -> Self {
        let prg = pio::pio_asm!(
            ".wrap_target",
            "pull block",
            "mov x, osr",
            "bitloop:",
            "wait 0 pin 0",
            "nop [4]",
            "in pins, 1 [1]",
            "in pins, 1 [1]",
            "in pins, 1",
            "wait 1 pin 0",
            "jmp x-- bitloop",
            ".wrap"
        );

        let installed = common.load_program(&prg.program);
        let mut line = common.make_pio_pin(pin);
        line.set_pull(Pull::Up);

        let mut cfg = Config::default();
        cfg.use_program(&installed, &[]);
        cfg.set_in_pins(&[&line]);
        cfg.shift_out = shift_config(config.shift_out);
        cfg.shift_in = shift_config(config.shift_in);
        cfg.clock_divider = clock_divider(config.clock_divider);

        sm.set_config(&cfg);
        sm.set_pin_dirs(PioDirection::In, &[&line]);

        Self {
            sm,
            irq_flags,
            pin: line,
            origin: installed.origin,
            running: false,
        }
    }

    /// FIFO a DMA channel moving data in `direction` must target
    pub fn endpoint(&self, direction: Direction) -> FifoEndpoint {
        let regs = PIO::regs();
        let addr = match direction {
            Direction::Tx => regs.txf(SM).as_ptr() as u32,
            Direction::Rx => regs.rxf(SM).as_ptr() as u32,
        };
        FifoEndpoint {
            addr,
            dreq: dreq(PIO::INDEX, SM, direction),
            direction,
        }
    }

    /// Whether the state machine is enabled
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl<'d, PIO: PioBlock, const SM: usize> BitTransport for PioTransport<'d, PIO, SM> {
    fn start(&mut self) {
        self.sm.set_enable(true);
        self.running = true;
    }

    fn stop(&mut self) {
        self.sm.set_enable(false);
        self.running = false;
    }

    fn reset(&mut self) {
        self.sm.set_enable(false);
        self.sm.clear_fifos();
        self.sm.restart();
        // A transmit cut short may have left the line driven low
        self.sm.set_pin_dirs(PioDirection::In, &[&self.pin]);
        // SAFETY: origin is the entry point of the program this state machine runs
        unsafe {
            self.sm.exec_jmp(self.origin);
        }
        if self.running {
            self.sm.set_enable(true);
        }
    }

    fn force_start_notification(&mut self) {
        self.irq_flags.set(joywire_hal::transport::START_IRQ);
    }

    fn program_counter(&self) -> u8 {
        PIO::regs().sm(SM).addr().read().addr()
    }

    fn interrupt_flag(&self, index: u8) -> bool {
        self.irq_flags.check(index)
    }

    fn clear_interrupt_flag(&mut self, index: u8) {
        self.irq_flags.clear(index);
    }

    fn try_push(&mut self, word: u32) -> bool {
        self.sm.tx().try_push(word)
    }

    fn try_pull(&mut self) -> Option<u32> {
        self.sm.rx().try_pull()
    }
}
