//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;

/// Env var that overrides every other filter source.
pub const LOG_ENV: &str = "PROVGRAPH_LOG";

const DEFAULT_LEVEL: &str = "warn";
const VERBOSE_LEVEL: &str = "debug";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, defaulting to pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive.
    pub filter: String,
    /// Optional log file; stderr otherwise.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: DEFAULT_LEVEL.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from settings and the process env.
    ///
    /// Filter precedence: `PROVGRAPH_LOG`, then `RUST_LOG`, then `-v`, then
    /// the configured level.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        Self::resolve(settings, verbose, |key| std::env::var(key).ok())
    }

    fn resolve(
        settings: Option<&LoggingSettings>,
        verbose: bool,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let format = settings
            .and_then(|s| s.format.as_deref())
            .map(LogFormat::parse)
            .unwrap_or_default();
        let file = settings.and_then(|s| s.file.clone());

        let configured = settings
            .and_then(|s| s.level.clone())
            .filter(|level| !level.trim().is_empty());
        let filter = env(LOG_ENV)
            .or_else(|| env("RUST_LOG"))
            .filter(|value| !value.trim().is_empty())
            .or_else(|| verbose.then(|| VERBOSE_LEVEL.to_string()))
            .or(configured)
            .unwrap_or_else(|| DEFAULT_LEVEL.to_string());

        Self {
            format,
            filter,
            file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(level: Option<&str>) -> LoggingSettings {
        LoggingSettings {
            format: Some("json".to_string()),
            level: level.map(str::to_string),
            file: None,
        }
    }

    #[test]
    fn test_env_overrides_everything() {
        let config = LoggingConfig::resolve(Some(&settings(Some("info"))), true, |key| {
            (key == LOG_ENV).then(|| "provgraph=trace".to_string())
        });
        assert_eq!(config.filter, "provgraph=trace");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_verbose_beats_configured_level() {
        let config = LoggingConfig::resolve(Some(&settings(Some("info"))), true, |_| None);
        assert_eq!(config.filter, "debug");
    }

    #[test]
    fn test_defaults_without_settings() {
        let config = LoggingConfig::resolve(None, false, |_| None);
        assert_eq!(config.filter, "warn");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.file.is_none());
    }
}
