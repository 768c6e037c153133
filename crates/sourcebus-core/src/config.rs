// ABOUTME: Bus configuration loaded from sourcebus.toml
// ABOUTME: Request deadlines, initial state announcement, per-tick delivery limits, logging

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sourcebus_logging::LoggingConfig;
use std::path::Path;
use std::time::Duration;

/// Default per-request deadline
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Behaviour of the request/response scheduling on the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Deadline for a provider to answer a request, in milliseconds.
    /// When it passes the channel completes the request with `ProviderError`.
    /// `0` disables deadlines.
    pub request_timeout_ms: u64,

    /// Broadcast the provider's state to listeners right after a connection
    /// provider binds
    pub announce_initial_state: bool,

    /// Upper bound on completions delivered by a single tick. Anything beyond
    /// it stays queued for the next tick.
    pub max_completions_per_tick: Option<usize>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            announce_initial_state: true,
            max_completions_per_tick: None,
        }
    }
}

impl BusConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout_ms = timeout.map_or(0, |t| {
            u64::try_from(t.as_millis().max(1)).unwrap_or(u64::MAX)
        });
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_completions_per_tick == Some(0) {
            anyhow::bail!("max_completions_per_tick must be at least 1");
        }
        Ok(())
    }
}

/// Top-level configuration file: `[bus]` and `[logging]` tables, both optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcebusConfig {
    pub bus: BusConfig,
    pub logging: LoggingConfig,
}

impl SourcebusConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("Failed to parse sourcebus config")?;
        config.bus.validate()?;
        Ok(config)
    }

    /// Load a configuration file and apply logging environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        config.logging.apply_env_overrides()?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let mut config = Self::default();
            config.logging.apply_env_overrides()?;
            Ok(config)
        }
    }
}
