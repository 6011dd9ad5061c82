//! Service configuration, loaded from a YAML file.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::tan::TanConfig;

/// Top-level configuration.
///
/// ```yaml
/// listen: 127.0.0.1:3000
/// poll_interval_secs: 60
/// api:
///   timeout_secs: 10
/// stops:
///   - code: COMM
///     label: Commerce
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP query surface binds to.
    #[serde(default = "Config::default_listen")]
    pub listen: SocketAddr,

    /// Seconds between two refreshes of a stop.
    #[serde(default = "Config::default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upstream API settings.
    #[serde(default)]
    pub api: TanConfig,

    #[serde(default)]
    pub schedule_cache: CacheConfig,

    /// Stops to monitor.
    pub stops: Vec<StopConfig>,
}

/// One monitored stop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StopConfig {
    /// Stop code (`codeLieu`), e.g. "COMM".
    pub code: String,
    /// Display name, e.g. "Commerce".
    pub label: String,
}

impl Config {
    fn default_listen() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 3000))
    }

    fn default_poll_interval_secs() -> u64 {
        60
    }

    /// Read, parse and validate a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Read(format!("{}: {e}", path.as_ref().display())))?;

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("poll_interval_secs must be positive".into()));
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Invalid("api.timeout_secs must be positive".into()));
        }
        if self.schedule_cache.max_capacity == 0 {
            return Err(ConfigError::Invalid(
                "schedule_cache.max_capacity must be positive".into(),
            ));
        }
        if self.stops.is_empty() {
            return Err(ConfigError::Invalid("at least one stop is required".into()));
        }

        let mut seen = HashSet::new();
        for stop in &self.stops {
            if stop.code.trim().is_empty() {
                return Err(ConfigError::Invalid("stop code must not be blank".into()));
            }
            if !seen.insert(stop.code.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate stop code {}", stop.code)));
            }
        }
        Ok(())
    }

    /// Time between two refreshes of a stop.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(String),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}
