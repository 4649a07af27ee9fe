//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Installs the global stderr subscriber. The `RUST_LOG` environment
/// variable selects the filter; `info` is the default.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
