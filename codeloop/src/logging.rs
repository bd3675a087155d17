//! Diagnostic tracing for the loop.
//!
//! Tracing output goes to stderr and is controlled by `RUST_LOG`. The per-attempt
//! artifacts written by `--log-dir` (`io/attempt_log`) are product output and do
//! not depend on it.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Defaults to `warn` when `RUST_LOG` is unset.
///
/// ```bash
/// RUST_LOG=codeloop=debug codeloop run --signature "question -> answer" --input question=...
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
