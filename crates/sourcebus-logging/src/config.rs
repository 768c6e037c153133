// ABOUTME: Configuration structures and environment variable parsing for logging
// ABOUTME: Handles log levels, output targets, and file path configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use tracing::Level;

/// Environment variable holding the global log level
pub const LEVEL_ENV: &str = "SOURCEBUS_LOG";
pub const JSON_ENV: &str = "SOURCEBUS_LOG_JSON";
pub const NO_CONSOLE_ENV: &str = "SOURCEBUS_LOG_NO_CONSOLE";
/// Presence enables file output
pub const FILE_ENV: &str = "SOURCEBUS_LOG_FILE";

/// Wrapper for tracing::Level that implements Serialize/Deserialize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLevel(pub Level);

impl Serialize for LogLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.as_str().to_lowercase())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<LogLevel, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let level = parse_log_level(&s).map_err(serde::de::Error::custom)?;
        Ok(LogLevel(level))
    }
}

impl From<Level> for LogLevel {
    fn from(level: Level) -> Self {
        LogLevel(level)
    }
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        log_level.0
    }
}

/// Main configuration structure for the logging system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    pub level: LogLevel,

    /// Per-module log level overrides, e.g. `sourcebus_core = "trace"`
    pub module_levels: HashMap<String, LogLevel>,

    pub output: OutputConfig,

    pub file: FileConfig,
}

/// Configuration for different output targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub console: bool,

    /// Write to the rolling log file described by [`FileConfig`]
    pub file: bool,

    /// Emit JSON lines on stdout instead of human-readable console output
    pub json: bool,

    /// Pretty-print console output (vs compact)
    pub pretty_console: bool,
}

/// Configuration for file logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Path to log file (defaults to <config dir>/sourcebus/sourcebus.log)
    pub path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel(Level::INFO),
            module_levels: HashMap::new(),
            output: OutputConfig::default(),
            file: FileConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            console: true,
            file: false,
            json: false,
            pretty_console: false,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: default_log_file_path(),
        }
    }
}

impl LoggingConfig {
    /// Create a new configuration with environment variable overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides to this configuration.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // SOURCEBUS_LOG wins over RUST_LOG
        if let Ok(level_str) = env::var(LEVEL_ENV) {
            self.level = LogLevel(
                parse_log_level(&level_str).context(format!("Invalid {LEVEL_ENV} level"))?,
            );
        } else if let Ok(rust_log) = env::var("RUST_LOG") {
            self.parse_rust_log(&rust_log)?;
        }

        if env::var(JSON_ENV).is_ok() {
            self.output.json = true;
        }

        if env::var(NO_CONSOLE_ENV).is_ok() {
            self.output.console = false;
        }

        if let Ok(path) = env::var(FILE_ENV) {
            self.output.file = true;
            if !path.is_empty() {
                self.file.path = PathBuf::from(path);
            }
        }

        Ok(())
    }

    /// Parse RUST_LOG style directives ("debug" or "info,sourcebus_core=trace").
    pub fn parse_rust_log(&mut self, rust_log: &str) -> Result<()> {
        for directive in rust_log.split(',') {
            let directive = directive.trim();
            if directive.is_empty() {
                continue;
            }

            if let Some((module, level_str)) = directive.split_once('=') {
                let level = parse_log_level(level_str).context(format!(
                    "Invalid log level '{level_str}' for module '{module}'"
                ))?;
                self.module_levels
                    .insert(module.to_string(), LogLevel(level));
            } else {
                self.level = LogLevel(
                    parse_log_level(directive)
                        .context(format!("Invalid global log level '{directive}'"))?,
                );
            }
        }
        Ok(())
    }

    /// Filter directive string understood by `EnvFilter`
    pub fn filter_directives(&self) -> String {
        let mut modules: Vec<_> = self.module_levels.iter().collect();
        modules.sort_by(|a, b| a.0.cmp(b.0));

        let mut directives = vec![self.level.0.as_str().to_lowercase()];
        directives.extend(
            modules
                .into_iter()
                .map(|(module, level)| format!("{module}={}", level.0.as_str().to_lowercase())),
        );
        directives.join(",")
    }
}

fn default_log_file_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        config_dir.join("sourcebus").join("sourcebus.log")
    } else {
        PathBuf::from("sourcebus.log")
    }
}

/// Parse a log level string (case-insensitive).
pub fn parse_log_level(level_str: &str) -> Result<Level> {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
            level_str
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level.0, Level::INFO);
        assert!(config.output.console);
        assert!(!config.output.file);
        assert!(!config.output.json);
        assert!(config.file.path.to_string_lossy().contains("sourcebus.log"));
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("trace").unwrap(), Level::TRACE);
        assert_eq!(parse_log_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("Info").unwrap(), Level::INFO);
        assert_eq!(parse_log_level("warning").unwrap(), Level::WARN);
        assert_eq!(parse_log_level("error").unwrap(), Level::ERROR);

        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn test_parse_rust_log() {
        let mut config = LoggingConfig::default();
        config
            .parse_rust_log("warn, sourcebus_core=trace,sourcebus_local=debug")
            .unwrap();

        assert_eq!(config.level.0, Level::WARN);
        assert_eq!(
            config.module_levels.get("sourcebus_core"),
            Some(&LogLevel(Level::TRACE))
        );
        assert_eq!(
            config.module_levels.get("sourcebus_local"),
            Some(&LogLevel(Level::DEBUG))
        );

        assert!(config.parse_rust_log("sourcebus_core=chatty").is_err());
    }

    #[test]
    fn test_filter_directives_are_sorted() {
        let mut config = LoggingConfig::default();
        config.parse_rust_log("debug,zeta=warn,alpha=trace").unwrap();
        assert_eq!(config.filter_directives(), "debug,alpha=trace,zeta=warn");
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: LoggingConfig = serde_json::from_str(
            r#"{ "level": "debug", "module_levels": { "sourcebus_core": "trace" } }"#,
        )
        .unwrap();

        assert_eq!(config.level.0, Level::DEBUG);
        assert!(config.output.console);
        assert_eq!(
            config.module_levels.get("sourcebus_core"),
            Some(&LogLevel(Level::TRACE))
        );
    }
}
