//! Logging setup using tracing-subscriber

use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set. Otherwise only warnings are shown, or debug
/// output from this crate when `verbose` is set. Log lines go to stderr so
/// they never interleave with tables on stdout.
pub fn init_logging(verbose: bool) {
    let default_directive = if verbose { "fexum=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
