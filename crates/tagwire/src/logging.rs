//! Log subscriber setup.
//!
//! Library code only emits `tracing` events; binaries and tests decide
//! where they go. These helpers install a `tracing_subscriber` fmt
//! subscriber filtered by `RUST_LOG`, falling back to a default level.

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::TagwireError;

/// Installs the global subscriber, failing if one is already set.
///
/// `RUST_LOG` takes precedence over `default_level`, e.g.
/// `RUST_LOG=tagwire_transport=trace` for per-frame detail.
pub fn try_init(default_level: Level) -> Result<(), TagwireError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| TagwireError::Logging(e.to_string()))?;

    tracing::debug!(level = %default_level, "logging initialized");
    Ok(())
}

/// Installs the global subscriber, ignoring a second call.
pub fn init(default_level: Level) {
    if let Err(e) = try_init(default_level) {
        tracing::debug!(error = %e, "log subscriber already installed");
    }
}
