//! Development-time tracing for debugging agents.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Dev diagnostics via `RUST_LOG`, output to stderr.
//!   Not persisted, not part of foundry product output.
//!
//! - **Console output (`io/render`, `io/console`)**: Engine events and operator
//!   prompts on stdout, shaped by `--verbosity` and unaffected by `RUST_LOG`.
//!
//! - **Status files (`io/status`)**: Heartbeats for monitors, always written.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber for development logging.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=foundry=debug foundry programmer --project-dir ./app
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
