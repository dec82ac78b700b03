//! Tracing subscriber setup shared by the hub binaries.

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `level`. With `json` the output is one JSON
/// object per event. Calling this more than once is harmless; later calls keep
/// the subscriber that is already installed.
pub fn init_logging(service_id: &str, level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };
    if installed {
        tracing::debug!(service = service_id, "logging initialised at level '{level}'");
    }
}
