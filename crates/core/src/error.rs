//! Error types for the application-facing layers.

use thiserror::Error;

/// Error type for windowing, configuration and startup failures.
///
/// GPU failures live in `deferred_rhi::RhiError`; they are converted to
/// [`Error::Gpu`] when they cross into application code.
#[derive(Error, Debug)]
pub enum Error {
    /// GPU layer errors, carried as text so this crate stays Vulkan-agnostic
    #[error("GPU error: {0}")]
    Gpu(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration file
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration values that parse but cannot be used
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the core Error type.
pub type Result<T> = std::result::Result<T, Error>;
