//! Log output for the binaries.

use tracing_subscriber::EnvFilter;

/// Default filter when neither `RUST_LOG` nor `--log-level` is given.
pub const DEFAULT_FILTER: &str = "info";

/// Builds the filter: explicit level first, then `RUST_LOG`, then
/// [`DEFAULT_FILTER`].
#[must_use]
pub fn filter(level: Option<&str>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    }
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init(level: Option<&str>) {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(false)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(level = level.unwrap_or("env"), "logging initialised");
    }
}
