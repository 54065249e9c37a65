//! Core utilities shared by the deferred renderer crates.
//!
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - TOML configuration

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
