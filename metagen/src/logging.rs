//! Diagnostic tracing for the generator.
//!
//! Tracing is for whoever is debugging a run: it goes to stderr, is filtered
//! by `RUST_LOG`, and is never persisted. The per-iteration summary lines that
//! `metagen run` prints are product output on stdout and do not depend on it.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset or unparseable.
pub const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber: compact lines on stderr.
///
/// ```bash
/// RUST_LOG=metagen::io::sandbox=debug,metagen=info metagen run --task "..."
/// ```
///
/// Calling this twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact(),
        )
        .try_init();
}
