//! Structured logging setup using `tracing-subscriber`.
//!
//! The bot is a one-shot CLI, so there is a single console mode writing to
//! stderr. Stdout is reserved for the delivery report.

use tracing_subscriber::EnvFilter;

/// Default filter directive for a verbosity flag.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Build the filter: `RUST_LOG` when set, otherwise [`default_directive`].
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Initialise console logging for a CLI invocation.
///
/// Emits human-readable output to stderr only. Controlled by `RUST_LOG`
/// (default: `info`, or `debug` with `verbose`). Calling it twice is a
/// no-op.
pub fn init_cli(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(std::io::stderr)
        .try_init();
}
