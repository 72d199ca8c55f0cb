//! Build script for joywire-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Validates bus.toml at compile time

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

fn main() {
    setup_linker();
    validate_config();
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Copy memory.x to the output directory
    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    // Tell rustc where to find memory.x
    println!("cargo:rustc-link-search={}", out_dir.display());

    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Validate bus.toml at compile time
///
/// The firmware's own parser only understands a subset of TOML and falls
/// back to defaults on errors, so mistakes are caught here instead.
fn validate_config() {
    println!("cargo:rerun-if-changed=bus.toml");

    let config_path = Path::new("bus.toml");
    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: bus.toml not found!                                      ║\n\
            ║                                                                  ║\n\
            ║  The firmware embeds bus.toml from the joywire-firmware          ║\n\
            ║  directory. Restore it or create a new one.                      ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let config_content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read bus.toml                                  ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    let config: toml::Value = match toml::from_str(&config_content) {
        Ok(value) => value,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid TOML syntax in bus.toml                          ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                {}\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_error_lines(&e.to_string())
            );
        }
    };

    let mut errors = Vec::new();
    validate_transceiver(&config, &mut errors);
    validate_timing(&config, &mut errors);
    validate_loopback(&config, &mut errors);

    if !errors.is_empty() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: Invalid bus configuration                                ║\n\
            ╠══════════════════════════════════════════════════════════════════╣\n\
            {}\n\
            ╚══════════════════════════════════════════════════════════════════╝\n",
            errors
                .iter()
                .map(|e| format!("║  • {:<62} ║", e))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    println!("cargo:warning=bus.toml validated successfully");
}

/// Format error message lines with box drawing
fn format_error_lines(msg: &str) -> String {
    msg.lines()
        .map(|line| {
            let truncated = if line.len() > 64 {
                format!("{}...", &line[..61])
            } else {
                line.to_string()
            };
            format!("║  {:<64} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Check an optional integer key against an inclusive range
fn check_range(
    table: &toml::value::Table,
    section: &str,
    key: &str,
    min: i64,
    max: i64,
    errors: &mut Vec<String>,
) {
    match table.get(key) {
        Some(toml::Value::Integer(v)) if *v < min || *v > max => {
            errors.push(format!("[{}] {} must be {}-{}", section, key, min, max));
        }
        Some(toml::Value::Integer(_)) | None => {}
        Some(_) => errors.push(format!("[{}] {} must be an integer", section, key)),
    }
}

/// Fetch a section as a table, recording an error if it is not one
fn section<'a>(
    config: &'a toml::Value,
    name: &str,
    errors: &mut Vec<String>,
) -> Option<&'a toml::value::Table> {
    match config.get(name) {
        Some(toml::Value::Table(t)) => Some(t),
        Some(_) => {
            errors.push(format!("[{}] must be a table", name));
            None
        }
        None => None,
    }
}

fn validate_transceiver(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(table) = section(config, "transceiver", errors) else {
        return;
    };

    if let Some(mode) = table.get("mode") {
        if !matches!(mode.as_str(), Some("dma") | Some("fifo")) {
            errors.push("[transceiver] mode must be 'dma' or 'fifo'".to_string());
        }
    }
    if let Some(packing) = table.get("rx_packing") {
        // The receive program pushes one oversampled byte per word
        if packing.as_str() != Some("one") {
            errors.push("[transceiver] rx_packing must be 'one'".to_string());
        }
    }
    check_range(table, "transceiver", "bus_turn_timeout_us", 100, 1_000_000, errors);
    check_range(table, "transceiver", "poll_interval_us", 1, 1_000, errors);
}

fn validate_timing(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(table) = section(config, "timing", errors) else {
        return;
    };

    // The programs are timed for 16 cycles per 4us bit
    if let Some(toml::Value::Integer(hz)) = table.get("pio_clock_hz") {
        if *hz != 4_000_000 {
            errors.push("[timing] pio_clock_hz must be 4000000".to_string());
        }
    }
    check_range(table, "timing", "rx_settle_ms", 0, 10_000, errors);
    check_range(table, "timing", "tx_timeout_us", 100, 1_000_000, errors);
    check_range(table, "timing", "rx_timeout_us", 100, 1_000_000, errors);
}

fn validate_loopback(config: &toml::Value, errors: &mut Vec<String>) {
    let Some(table) = section(config, "loopback", errors) else {
        return;
    };

    if let Some(enabled) = table.get("enabled") {
        if !enabled.is_bool() {
            errors.push("[loopback] enabled must be true or false".to_string());
        }
    }
    check_range(table, "loopback", "interval_ms", 10, 3_600_000, errors);
    check_range(table, "loopback", "inter_frame_ms", 0, 60_000, errors);
}
