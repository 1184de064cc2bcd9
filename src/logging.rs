//! Logging initialization and environment-driven configuration.
//!
//! Log settings come from `SERVICEBAY_*` environment variables so that the
//! same binary can run with pretty logs on a laptop and JSON logs in a
//! container without a rebuild:
//!
//! - `SERVICEBAY_LOG_LEVEL`: `trace|debug|info|warn|error` (default `info`)
//! - `SERVICEBAY_LOG_FORMAT`: `json|pretty` (default `pretty`)
//! - `SERVICEBAY_LOG_INCLUDE_LOCATION`: `true|false` (default `false`)
//!
//! `RUST_LOG` takes precedence over `SERVICEBAY_LOG_LEVEL` when set, which
//! keeps per-module filters available for debugging.

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Single-line JSON, one object per event. Meant for log collectors.
    Json,
    /// Multi-line human-readable output for local development.
    Pretty,
}

impl LogFormat {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" => Some(LogFormat::Pretty),
            _ => None,
        }
    }
}

/// Logging configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub format: LogFormat,
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Pretty,
            include_location: false,
        }
    }
}

impl LogConfig {
    /// Read configuration from `SERVICEBAY_LOG_*` variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let log_level =
            std::env::var("SERVICEBAY_LOG_LEVEL").unwrap_or_else(|_| defaults.log_level.clone());
        let format = std::env::var("SERVICEBAY_LOG_FORMAT")
            .ok()
            .and_then(|v| LogFormat::parse(&v))
            .unwrap_or(defaults.format);
        let include_location = std::env::var("SERVICEBAY_LOG_INCLUDE_LOCATION")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(defaults.include_location);
        Self {
            log_level,
            format,
            include_location,
        }
    }
}

/// Install the global tracing subscriber.
///
/// Returns an error if a subscriber is already set, so tests that each try to
/// initialize logging should treat the error as non-fatal.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}

/// Shorten a credential for logging. Never log a full token.
pub fn token_preview(token: &str) -> String {
    if token.is_empty() {
        return "<empty>".to_string();
    }
    let prefix: String = token.chars().take(4).collect();
    format!("{prefix}***")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parse_is_case_insensitive() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("Pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("yaml"), None);
    }

    #[test]
    fn preview_never_exposes_the_whole_token() {
        assert_eq!(token_preview(""), "<empty>");
        assert_eq!(token_preview("ab"), "ab***");
        let preview = token_preview("abcdef0123456789");
        assert_eq!(preview, "abcd***");
        assert!(!preview.contains("0123456789"));
    }
}
