//! Simple TOML parser for bus configuration
//!
//! This is a minimal TOML parser that handles only the subset needed for
//! bus.toml. It does NOT support the full TOML spec.
//!
//! Supported features:
//! - Key = value pairs (string, integer, boolean)
//! - [section] headers
//! - Comments (# ...)
//!
//! Unknown keys are ignored; unknown sections are an error.

use joywire_core::config::{BusConfig, TransferMode};
use joywire_core::RxPacking;

/// Parse error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Invalid section header
    InvalidSection,
    /// Invalid value type
    InvalidValue,
    /// Unsupported config version
    UnsupportedVersion,
}

/// Current parsing context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Root,
    Transceiver,
    Timing,
    Loopback,
}

/// Parse TOML configuration into BusConfig
pub fn parse_config(input: &str) -> Result<BusConfig, ParseError> {
    let mut config = BusConfig::new();
    let mut section = Section::Root;

    for line in input.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            section = parse_section_header(&line[1..line.len() - 1])?;
            continue;
        }

        if let Some((key, value)) = parse_key_value(line) {
            apply_value(section, key, value, &mut config)?;
        }
    }

    if config.version != 1 {
        return Err(ParseError::UnsupportedVersion);
    }

    Ok(config)
}

fn parse_section_header(header: &str) -> Result<Section, ParseError> {
    match header.trim() {
        "transceiver" => Ok(Section::Transceiver),
        "timing" => Ok(Section::Timing),
        "loopback" => Ok(Section::Loopback),
        _ => Err(ParseError::InvalidSection),
    }
}

fn apply_value(
    section: Section,
    key: &str,
    value: &str,
    config: &mut BusConfig,
) -> Result<(), ParseError> {
    match section {
        Section::Root => {
            if key == "version" {
                config.version = parse_int(value)?;
            }
        }
        Section::Transceiver => {
            let t = &mut config.transceiver;
            match key {
                "mode" => t.mode = parse_mode(value)?,
                "rx_packing" => t.rx_packing = parse_packing(value)?,
                "bus_turn_timeout_us" => t.bus_turn_timeout_us = parse_int(value)?,
                "poll_interval_us" => t.poll_interval_us = parse_int(value)?,
                _ => {}
            }
        }
        Section::Timing => {
            let t = &mut config.timing;
            match key {
                "pio_clock_hz" => t.pio_clock_hz = parse_int(value)?,
                "rx_settle_ms" => t.rx_settle_ms = parse_int(value)?,
                "tx_timeout_us" => t.tx_timeout_us = parse_int(value)?,
                "rx_timeout_us" => t.rx_timeout_us = parse_int(value)?,
                _ => {}
            }
        }
        Section::Loopback => {
            let l = &mut config.loopback;
            match key {
                "enabled" => l.enabled = parse_bool(value)?,
                "interval_ms" => l.interval_ms = parse_int(value)?,
                "inter_frame_ms" => l.inter_frame_ms = parse_int(value)?,
                _ => {}
            }
        }
    }
    Ok(())
}

/// Split a line into key and value, dropping inline comments
fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    let eq_pos = line.find('=')?;
    let key = line[..eq_pos].trim();
    let value = line[eq_pos + 1..].trim();

    // Remove inline comments
    let value = if let Some(hash_pos) = value.find('#') {
        // Make sure # is not inside a string
        let quote_count = value[..hash_pos].matches('"').count();
        if quote_count % 2 == 0 {
            value[..hash_pos].trim()
        } else {
            value
        }
    } else {
        value
    };

    if key.is_empty() || value.is_empty() {
        return None;
    }

    Some((key, value))
}

/// Parse a string value (removes quotes)
fn parse_string(value: &str) -> &str {
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        &value[1..value.len() - 1]
    } else {
        // Allow unquoted strings for simple values
        value
    }
}

/// Parse an integer value, allowing `_` separators
fn parse_int<T: core::str::FromStr>(value: &str) -> Result<T, ParseError> {
    let mut digits = [0u8; 24];
    let mut len = 0;
    for b in value.bytes().filter(|b| *b != b'_') {
        *digits.get_mut(len).ok_or(ParseError::InvalidValue)? = b;
        len += 1;
    }
    core::str::from_utf8(&digits[..len])
        .map_err(|_| ParseError::InvalidValue)?
        .parse()
        .map_err(|_| ParseError::InvalidValue)
}

fn parse_bool(value: &str) -> Result<bool, ParseError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ParseError::InvalidValue),
    }
}

fn parse_mode(value: &str) -> Result<TransferMode, ParseError> {
    match parse_string(value) {
        "dma" => Ok(TransferMode::Dma),
        "fifo" => Ok(TransferMode::Fifo),
        _ => Err(ParseError::InvalidValue),
    }
}

fn parse_packing(value: &str) -> Result<RxPacking, ParseError> {
    match parse_string(value) {
        "one" => Ok(RxPacking::OneBytePerWord),
        // The receive program autopushes every 24 samples: one byte per word
        _ => Err(ParseError::InvalidValue),
    }
}
