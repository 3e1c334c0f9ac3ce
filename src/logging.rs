//! Tracing setup for the `fdx` binary.
//!
//! Logs go to stderr so command output on stdout stays pipeable.
//! `RUST_LOG` overrides the default filter; `--verbose` forces debug.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "filedex=info";
const VERBOSE_LOG_FILTER: &str = "filedex=debug,tower_http=debug";

pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    // A second init (tests driving main-like code) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .try_init();
}
