//! Tracing/logging initialization.

use core::str::FromStr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown log format '{0}' (expected 'json' or 'pretty')")]
pub struct UnknownLogFormat(String);

/// Output format of log lines.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable, for local development.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(UnknownLogFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// `EnvFilter` directive, e.g. `info,workshop_infra=debug`.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl TracingConfig {
    pub const FILTER_VAR: &'static str = "WORKSHOP_LOG";
    pub const FORMAT_VAR: &'static str = "WORKSHOP_LOG_FORMAT";

    /// Read `WORKSHOP_LOG` (falling back to `RUST_LOG`) and `WORKSHOP_LOG_FORMAT`.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// An unrecognised format falls back to JSON rather than failing startup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let filter = lookup(Self::FILTER_VAR)
            .or_else(|| lookup("RUST_LOG"))
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(defaults.filter);
        let format = lookup(Self::FORMAT_VAR)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(defaults.format);
        Self { filter, format }
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(config: &TracingConfig) {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    let _ = match config.format {
        LogFormat::Json => builder.json().with_target(false).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workshop_log_wins_over_rust_log() {
        let config = TracingConfig::from_lookup(|var| match var {
            "WORKSHOP_LOG" => Some("debug".to_string()),
            "RUST_LOG" => Some("warn".to_string()),
            _ => None,
        });
        assert_eq!(config.filter, "debug");
    }

    #[test]
    fn rust_log_is_the_fallback_filter() {
        let config =
            TracingConfig::from_lookup(|var| (var == "RUST_LOG").then(|| "warn".to_string()));
        assert_eq!(config.filter, "warn");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn format_parsing() {
        assert_eq!("PRETTY".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
        let config = TracingConfig::from_lookup(|var| {
            (var == "WORKSHOP_LOG_FORMAT").then(|| "xml".to_string())
        });
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn init_twice_is_harmless() {
        let config = TracingConfig {
            filter: "off".to_string(),
            format: LogFormat::Pretty,
        };
        init(&config);
        init(&config);
    }
}
