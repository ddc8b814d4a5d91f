//! Diagnostic logging for the CLI.
//!
//! Diagnostics are written to stderr so stdout carries nothing but log
//! entries and can be piped.
//!
//! The level is chosen in this order:
//! 1. `--verbose`: DEBUG for the bidi-log crates
//! 2. `--quiet`: ERROR only
//! 3. `RUST_LOG`: custom filter
//! 4. Default: INFO for the bidi-log crates

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERBOSE_FILTER: &str = "bidi_log=debug,bidi_log_cli=debug";
const QUIET_FILTER: &str = "bidi_log=error,bidi_log_cli=error";
const DEFAULT_FILTER: &str = "bidi_log=info,bidi_log_cli=info";

/// Picks the filter for the given flags.
#[must_use]
pub fn env_filter(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Installs the global subscriber. Call once, before any logging.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter(verbose, quiet))
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    // The global subscriber can only be installed once per process, so these
    // only check filter selection.

    #[test]
    fn test_verbose_wins() {
        assert_eq!(env_filter(true, false).to_string(), EnvFilter::new(VERBOSE_FILTER).to_string());
    }

    #[test]
    fn test_quiet_filter() {
        assert_eq!(env_filter(false, true).to_string(), EnvFilter::new(QUIET_FILTER).to_string());
    }
}
