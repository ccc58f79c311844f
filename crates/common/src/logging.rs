//! `tracing` subscriber setup shared by binaries and tests.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Filter directives come from `RUST_LOG`, falling back to `default_filter`
/// (e.g. `"info"` or `"runtime=debug"`). Safe to call more than once; later
/// calls are no-ops.
pub fn init_logging(default_filter: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let result = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    // A subscriber registered by an earlier call (or a test harness) is fine.
    if result.is_err() {
        tracing::debug!("global tracing subscriber already set");
    }
    Ok(())
}
