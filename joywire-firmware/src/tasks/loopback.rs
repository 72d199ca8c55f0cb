//! Loopback self-test task
//!
//! With the TX pin wired to the RX pin every frame sent is also received.
//! Each pass exchanges a fixed set of frames and compares what came back.
//! The 17-byte frame exceeds the DMA limit and must be rejected before
//! anything reaches the bus.

use defmt::*;
use embassy_rp::peripherals::{DMA_CH0, DMA_CH1, PIO0, PIO1};
use embassy_time::{Delay, Timer};
use portable_atomic::{AtomicU32, Ordering};

use joywire_core::config::{LoopbackConfig, TimingConfig};
use joywire_core::{ExchangeError, Transceiver, TxError};
use joywire_hal_rp2040::{DmaChannel, PioTransport};

/// The transceiver as wired on this board
pub type BusTransceiver = Transceiver<
    'static,
    PioTransport<'static, PIO0, 0>,
    DmaChannel<'static, DMA_CH0>,
    PioTransport<'static, PIO1, 0>,
    DmaChannel<'static, DMA_CH1>,
    Delay,
>;

/// Completed passes with every frame matching
pub static LOOPBACK_PASSES: AtomicU32 = AtomicU32::new(0);

/// Completed passes with at least one failed frame
pub static LOOPBACK_FAILURES: AtomicU32 = AtomicU32::new(0);

const TEST_FRAMES: &[&[u8]] = &[
    &[0xA5],
    &[0xFF],
    &[0x00],
    &[0xA5, 0x5A],
    &[0x78, 0x56, 0x34, 0x12],
    &[0x12, 0x34, 0x56, 0x78],
    &[0x89, 0xAB, 0xCD, 0xEF],
    &[0x12, 0x34, 0x56, 0x78, 0x9A],
    &[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0, 0x12, 0x34],
    &[0x01, 0x12, 0x23, 0x34, 0x45, 0x56, 0x67, 0x78, 0x89, 0x9A, 0xAB],
    &[0x01, 0x12, 0x23, 0x34, 0x45, 0x56, 0x67, 0x78, 0x89, 0x9A, 0xAB, 0xBC],
    &[
        0x01, 0x12, 0x23, 0x34, 0x45, 0x56, 0x67, 0x78, 0x89, 0x9A, 0xAB, 0xBC, 0xCD,
    ],
    &[
        0x01, 0x12, 0x23, 0x34, 0x45, 0x56, 0x67, 0x78, 0x89, 0x9A, 0xAB, 0xBC, 0xCD, 0xDE,
    ],
    &[
        0x01, 0x12, 0x23, 0x34, 0x45, 0x56, 0x67, 0x78, 0x89, 0x9A, 0xAB, 0xBC, 0xCD, 0xDE,
        0xEF,
    ],
    &[
        0x01, 0x12, 0x23, 0x34, 0x45, 0x56, 0x67, 0x78, 0x89, 0x9A, 0xAB, 0xBC, 0xCD, 0xDE,
        0xEF, 0xF0,
    ],
    &[
        0x01, 0x12, 0x23, 0x34, 0x45, 0x56, 0x67, 0x78, 0x89, 0x9A, 0xAB, 0xBC, 0xCD, 0xDE,
        0xEF, 0xF0, 0x01,
    ],
];

/// Result of one frame of a pass
enum Check {
    Match,
    Mismatch,
    RejectedAsExpected,
    Failed,
}

/// Loopback task - exchanges the test frames forever
#[embassy_executor::task]
pub async fn loopback_task(
    mut bus: BusTransceiver,
    timing: TimingConfig,
    config: LoopbackConfig,
) {
    info!("Loopback task started");

    loop {
        let mut ok = true;

        for frame in TEST_FRAMES {
            match check_frame(&mut bus, frame, &timing).await {
                Check::Match | Check::RejectedAsExpected => {}
                Check::Mismatch | Check::Failed => ok = false,
            }
            Timer::after_millis(config.inter_frame_ms as u64).await;
        }

        if ok {
            let passes = LOOPBACK_PASSES.fetch_add(1, Ordering::Relaxed) + 1;
            info!("Loopback pass {} OK", passes);
        } else {
            LOOPBACK_FAILURES.fetch_add(1, Ordering::Relaxed);
            let diag = bus.diagnostics();
            warn!("Loopback pass failed, state {:?}", diag);
        }

        Timer::after_millis(config.interval_ms as u64).await;
    }
}

async fn check_frame(bus: &mut BusTransceiver, frame: &[u8], timing: &TimingConfig) -> Check {
    let too_long = frame.len() > bus.max_frame_bytes();

    // One deadline covers both halves; the receive finishes right after the send
    let timeout_us = timing.tx_timeout_us.max(timing.rx_timeout_us);

    debug!("TX {} bytes: {=[u8]:#x}", frame.len(), frame);
    match bus.exchange(frame, frame.len(), timeout_us).await {
        Ok(_) if too_long => {
            error!("{}-byte frame was not rejected", frame.len());
            Check::Failed
        }
        Ok(received) if received.as_bytes() == frame => {
            debug!("RX {=[u8]:#x}", received.as_bytes());
            Check::Match
        }
        Ok(received) => {
            warn!(
                "Mismatch: sent {=[u8]:#x}, received {=[u8]:#x}",
                frame,
                received.as_bytes()
            );
            Check::Mismatch
        }
        Err(ExchangeError::Tx(TxError::FrameTooLong)) if too_long => {
            debug!("{}-byte frame rejected as too long", frame.len());
            Check::RejectedAsExpected
        }
        Err(e) => {
            warn!("Exchange of {} bytes failed: {:?}", frame.len(), e);
            Check::Failed
        }
    }
}
