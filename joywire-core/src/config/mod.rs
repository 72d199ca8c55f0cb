//! Configuration types
//!
//! Board-agnostic configuration structures. The firmware fills them from
//! its embedded TOML file; anything left out keeps the `Default` value.

pub mod hardware;
pub mod types;

pub use hardware::*;
pub use types::*;
