//! Configuration loading and parsing
//!
//! Loads the embedded bus.toml, parsed by a custom no_std parser.

pub mod loader;
pub mod toml;

pub use loader::load_config;
pub use toml::parse_config;
