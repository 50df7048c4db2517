//! Process-wide tracing setup shared by every binary.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber: JSON lines to stdout, level controlled
/// by `RUST_LOG` with `info` as the fallback. Calling this twice is a
/// no-op, which keeps test binaries happy.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
