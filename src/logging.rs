// src/logging.rs

//! Logging setup for `hotswap` using `tracing` + `tracing-subscriber`.
//!
//! The filter is chosen in this order:
//! 1. `--log-level` on the command line
//! 2. `HOTSWAP_LOG`, which takes full `EnvFilter` directives
//!    (`info`, `hotswap::redefine=debug,warn`, ...)
//! 3. `info`
//!
//! Output goes to stderr; the live process owns stdout.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "HOTSWAP_LOG";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = resolve_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("installing log subscriber: {e}"))
}

/// Build the filter from the CLI flag and the raw env value. An env value
/// that does not parse falls back to `info` rather than silencing output.
pub fn resolve_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level.directive());
    }
    env.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flag_wins_over_env() {
        let filter = resolve_filter(Some(LogLevel::Trace), Some("error"));
        assert_eq!(filter.to_string(), "trace");
    }

    #[test]
    fn env_directives_are_kept() {
        let filter = resolve_filter(None, Some("hotswap::redefine=debug"));
        assert_eq!(filter.to_string(), "hotswap::redefine=debug");
    }

    #[test]
    fn blank_env_means_info() {
        assert_eq!(resolve_filter(None, Some("  ")).to_string(), "info");
        assert_eq!(resolve_filter(None, None).to_string(), "info");
    }
}
