//! BOOTSEL button task
//!
//! A press on the button pin reboots into the USB bootloader, so new
//! firmware can be flashed without touching the board's own BOOTSEL.

use defmt::*;
use embassy_rp::gpio::{Input, Level};
use embassy_time::Timer;

/// Debounce delay after the falling edge
const DEBOUNCE_MS: u64 = 100;

/// Button task - waits for a debounced press, then reboots to the bootloader
#[embassy_executor::task]
pub async fn bootsel_task(mut button: Input<'static>) {
    info!("BOOTSEL task started");

    loop {
        button.wait_for_falling_edge().await;
        Timer::after_millis(DEBOUNCE_MS).await;

        // Still held after the debounce: a real press
        if button.get_level() == Level::Low {
            warn!("BOOTSEL pressed, rebooting to USB bootloader");
            embassy_rp::rom_data::reset_to_usb_boot(0, 0);
        }
    }
}
