//! Configuration for sampling and spike analysis
//!
//! Values come from three layers: built-in defaults, an optional TOML file
//! (`--config`), and command-line flags, each overriding the previous one.
//!
//! ```toml
//! [monitor]
//! interval_ms = 10
//! timeout_secs = 180.0
//!
//! [spikes]
//! threshold_mb = 20.0
//! window_ms = 1000.0
//! top_k = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Sampling loop settings
///
/// # Example
/// ```
/// use memspike::config::MonitorConfig;
///
/// let config = MonitorConfig::default();
/// assert_eq!(config.interval_ms, 10);
/// assert_eq!(config.timeout_secs, 180.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Delay between polls. Processing time is not compensated, so the
    /// effective cadence is slightly longer.
    pub interval_ms: u64,

    /// Wall-clock budget for one run, independent of target liveness
    pub timeout_secs: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10,
            timeout_secs: 180.0,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.interval_ms == 0 {
            return Err("interval_ms must be > 0".to_string());
        }

        if !self.timeout_secs.is_finite() || self.timeout_secs <= 0.0 {
            return Err(format!(
                "timeout_secs must be a positive number, got {}",
                self.timeout_secs
            ));
        }

        Ok(())
    }
}

/// Spike detection and reporting settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeConfig {
    /// Minimum RSS increase between adjacent samples (exclusive)
    pub threshold_mb: f64,

    /// Maximum spacing between adjacent samples (exclusive)
    pub window_ms: f64,

    /// Number of spikes shown in the report, largest first
    pub top_k: usize,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            threshold_mb: 20.0,
            window_ms: 1000.0,
            top_k: 10,
        }
    }
}

impl SpikeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.threshold_mb.is_finite() || self.threshold_mb < 0.0 {
            return Err(format!(
                "threshold_mb must be >= 0, got {}",
                self.threshold_mb
            ));
        }

        if !self.window_ms.is_finite() || self.window_ms <= 0.0 {
            return Err(format!("window_ms must be > 0, got {}", self.window_ms));
        }

        if self.top_k == 0 {
            return Err("top_k must be >= 1".to_string());
        }

        Ok(())
    }
}

/// Complete tool configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub spikes: SpikeConfig,
}

impl Config {
    /// Load a TOML configuration file
    ///
    /// Values are not validated here: command-line flags may still override
    /// them, so callers validate the merged result.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.monitor.validate().map_err(ConfigError::Invalid)?;
        self.spikes.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}
