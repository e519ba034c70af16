//! Tracing subscriber bootstrap.

use tracing_subscriber::EnvFilter;

/// Install the default `tracing` subscriber unless one is already set.
///
/// The filter comes from `RUST_LOG`, falling back to `info`. Safe to call
/// from multiple entry points; only the first call installs anything.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
