//! Joywire - Joybus frame transceiver firmware
//!
//! Main firmware binary for the Raspberry Pi Pico (RP2040). Drives the
//! single-wire Joybus line with two PIO state machines and moves frame
//! words with DMA. In the default wiring GP15 (TX) is jumpered to GP16
//! (RX) and a loopback self-test runs continuously.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::interrupt;
use embassy_rp::interrupt::InterruptExt;
use embassy_rp::peripherals::{PIO0, PIO1};
use embassy_rp::pio::Pio;
use embassy_time::{Delay, Timer};
use portable_atomic::Ordering;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use joywire_core::{Port, Transceiver, TransferBuffers};
use joywire_hal::transport::{BitTransport, TransportConfig};
use joywire_hal::{ClockDivider, Direction, ShiftConfig};
use joywire_hal_rp2040::pins::{BusPeripherals, RX_PIN, TX_PIN};
use joywire_hal_rp2040::pio::SYS_CLK_HZ;
use joywire_hal_rp2040::{on_dma_irq, DmaChannel, PioTransport};

mod config;
mod tasks;

bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => embassy_rp::pio::InterruptHandler<PIO0>;
    PIO1_IRQ_0 => embassy_rp::pio::InterruptHandler<PIO1>;
});

// Word buffers the DMA channels read and write (must live forever)
static BUFFERS: StaticCell<TransferBuffers> = StaticCell::new();

/// Bus transfer completions
#[interrupt]
fn DMA_IRQ_1() {
    on_dma_irq();
}

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Joywire firmware starting...");

    // Initialize RP2040 peripherals
    let p = embassy_rp::init(Default::default());
    let board = BusPeripherals::from_peripherals(p);
    info!("Peripherals initialized");

    let config = config::load_config();

    // Status LED on while the firmware runs
    let _led = Output::new(board.led, Level::High);

    let bootsel = Input::new(board.bootsel, Pull::Up);

    // Transmit on PIO0, receive on PIO1: each block's IRQ flags belong to one program
    let Pio {
        common: mut tx_common,
        irq_flags: tx_flags,
        sm0: tx_sm,
        ..
    } = Pio::new(board.pio_tx, Irqs);
    let Pio {
        common: mut rx_common,
        irq_flags: rx_flags,
        sm0: rx_sm,
        ..
    } = Pio::new(board.pio_rx, Irqs);

    let clock_divider = ClockDivider::from_frequencies(SYS_CLK_HZ, config.timing.pio_clock_hz);
    let tx_config = TransportConfig {
        pin: TX_PIN,
        shift_out: ShiftConfig::transmit(),
        shift_in: ShiftConfig::receive(),
        clock_divider,
    };
    let rx_config = TransportConfig {
        pin: RX_PIN,
        // The bit count is pulled explicitly
        shift_out: ShiftConfig {
            auto: false,
            ..ShiftConfig::transmit()
        },
        shift_in: ShiftConfig::receive(),
        clock_divider,
    };

    let mut tx_transport =
        PioTransport::new_tx(&mut tx_common, tx_sm, tx_flags, board.tx_pin, &tx_config);
    let mut rx_transport =
        PioTransport::new_rx(&mut rx_common, rx_sm, rx_flags, board.rx_pin, &rx_config);
    info!(
        "PIO transports loaded (TX GP{}, RX GP{})",
        TX_PIN, RX_PIN
    );

    let (tx_channel, tx_signal) =
        DmaChannel::claim(board.dma_tx, tx_transport.endpoint(Direction::Tx)).unwrap();
    let (rx_channel, rx_signal) =
        DmaChannel::claim(board.dma_rx, rx_transport.endpoint(Direction::Rx)).unwrap();

    interrupt::DMA_IRQ_1.unpend();
    // SAFETY: the handler only touches the completion cells and DMA status registers
    unsafe { interrupt::DMA_IRQ_1.enable() };
    info!("DMA channels claimed");

    // Receiver first, so the first transmitted edge is not missed
    rx_transport.start();
    Timer::after_millis(config.timing.rx_settle_ms as u64).await;
    tx_transport.start();

    let bus = Transceiver::new(
        Port::new(tx_transport, tx_channel, tx_signal),
        Port::new(rx_transport, rx_channel, rx_signal),
        Delay,
        config.transceiver,
        BUFFERS.init(TransferBuffers::new()),
    );
    info!("Transceiver ready, max frame {} bytes", bus.max_frame_bytes());

    // Spawn tasks
    spawner.spawn(tasks::bootsel_task(bootsel)).unwrap();

    // Keeps the transceiver alive when the self-test is off
    let mut _idle_bus = None;
    if config.loopback.enabled {
        spawner
            .spawn(tasks::loopback_task(bus, config.timing, config.loopback))
            .unwrap();
    } else {
        info!("Loopback self-test disabled");
        _idle_bus = Some(bus);
    }

    info!("All tasks spawned, firmware running");

    loop {
        Timer::after_secs(60).await;
        trace!(
            "Main loop heartbeat: {} passes, {} failed",
            tasks::LOOPBACK_PASSES.load(Ordering::Relaxed),
            tasks::LOOPBACK_FAILURES.load(Ordering::Relaxed)
        );
    }
}
