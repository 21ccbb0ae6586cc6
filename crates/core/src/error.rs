//! Error types shared by the engine crates.

use std::path::PathBuf;

use thiserror::Error;

/// Errors outside the GPU layer: windowing, configuration and IO.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or event loop errors
    #[error("Window error: {0}")]
    Window(String),

    /// Surface creation or window-system extension queries
    #[error("Vulkan surface error: {0}")]
    Surface(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A config file that exists but cannot be read
    #[error("failed to read config {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config file that does not parse
    #[error("invalid config {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Semantically invalid configuration values
    #[error("Config error: {0}")]
    Config(String),

    /// A global tracing subscriber is already installed
    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type alias using the engine's core Error type.
pub type Result<T> = std::result::Result<T, Error>;
