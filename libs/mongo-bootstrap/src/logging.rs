//! Stdout logging setup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, used when neither `-v` nor `RUST_LOG` is given.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Text,
        }
    }
}

/// Filter directive for a `-v` count, if any.
#[must_use]
pub fn verbosity_directive(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    }
}

/// Resolve the filter: `-v` flags, then `RUST_LOG`, then the configured level.
///
/// # Errors
/// Returns an error if the chosen directive does not parse.
pub fn build_filter(config: &LoggingConfig, verbose: u8) -> anyhow::Result<EnvFilter> {
    if let Some(directive) = verbosity_directive(verbose) {
        return Ok(EnvFilter::try_new(directive)?);
    }
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(&config.level)?),
    }
}

/// Install the global subscriber writing line-oriented records to stdout.
///
/// # Errors
/// Returns an error if the filter is invalid or a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig, verbose: u8) -> anyhow::Result<()> {
    let filter = build_filter(config, verbose)?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_target(false);

    match config.format {
        LogFormat::Text => builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize logger: {e}"))?,
        LogFormat::Json => builder
            .json()
            .with_ansi(false)
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize JSON logger: {e}"))?,
    }

    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(verbosity_directive(0), None);
        assert_eq!(verbosity_directive(1), Some("info"));
        assert_eq!(verbosity_directive(2), Some("debug"));
        assert_eq!(verbosity_directive(7), Some("trace"));
    }

    #[test]
    fn verbose_flag_wins_over_config() {
        let cfg = LoggingConfig {
            level: "warn".to_owned(),
            format: LogFormat::Json,
        };
        let filter = build_filter(&cfg, 2).unwrap();
        assert_eq!(filter.to_string(), "debug");
    }
}
