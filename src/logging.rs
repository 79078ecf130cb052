//! Diagnostic logging through `tracing`.
//!
//! Findings and the progress bar are printed by the CLI itself; this only
//! covers internal diagnostics, written to stderr.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive for a `-v` count.
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the verbosity flag.
/// Calling it twice is harmless; the second call is ignored.
pub fn init(verbosity: u8, no_color: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_for(verbosity)));

    let fmt_layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_target(verbosity > 1);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
