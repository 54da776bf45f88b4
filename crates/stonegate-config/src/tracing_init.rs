//! Global `tracing` subscriber installation.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install the global tracing subscriber, reading `RUST_LOG` for filtering
/// and falling back to `default_level` when it is unset. Safe to call more
/// than once; only the first call takes effect.
pub fn init_tracing(default_level: &str) {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level.to_string()));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    });
}
