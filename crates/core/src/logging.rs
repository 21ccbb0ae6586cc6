//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::error::{Error, Result};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,renderer_rhi=debug,renderer_renderer=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize the logging system with tracing.
///
/// This sets up tracing-subscriber with:
/// - Environment-based filtering (RUST_LOG), defaulting to [`DEFAULT_FILTER`]
/// - Targets and thread ids on every line
///
/// Panics if a global subscriber is already set; see [`try_init_logging`].
///
/// # Example
/// ```
/// renderer_core::init_logging();
/// tracing::info!("Engine starting");
/// ```
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

/// Like [`init_logging`], but reports an already-installed subscriber as an
/// error instead of panicking.
pub fn try_init_logging() -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn test_second_init_is_reported() {
        // The first call may or may not win depending on test ordering.
        let _ = try_init_logging();
        assert!(matches!(try_init_logging(), Err(Error::Logging(_))));
    }
}
