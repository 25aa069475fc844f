//! Tracing bootstrap for embedders

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Intended to be called once by the embedding bot process. Filtering is
/// controlled through `RUST_LOG` (`linkbox=debug` etc.); defaults to
/// `info` when unset. Calling this twice is harmless: the second call is
/// ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
