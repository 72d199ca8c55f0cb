//! Configuration loading
//!
//! The bus configuration is embedded at build time (and validated by
//! build.rs). Falls back to defaults if it cannot be parsed.

use defmt::*;

use joywire_core::config::{BusConfig, TransferMode};

use super::toml::parse_config;

/// Embedded bus configuration
const BUS_TOML: &str = include_str!("../../bus.toml");

/// Load the bus configuration
pub fn load_config() -> BusConfig {
    match parse_config(BUS_TOML) {
        Ok(config) => {
            log_config_summary(&config);
            config
        }
        Err(e) => {
            warn!("bus.toml parse error: {:?}, using defaults", e);
            BusConfig::new()
        }
    }
}

/// Log a summary of the loaded configuration
fn log_config_summary(config: &BusConfig) {
    info!("Configuration loaded successfully");
    let mode = match config.transceiver.mode {
        TransferMode::Dma => "dma",
        TransferMode::Fifo => "fifo",
    };
    debug!(
        "  mode {}, max frame {} bytes",
        mode,
        config.transceiver.max_frame_bytes()
    );
    debug!(
        "  rx timeout {}us, tx timeout {}us",
        config.timing.rx_timeout_us, config.timing.tx_timeout_us
    );
    debug!("  loopback enabled: {}", config.loopback.enabled);
}
