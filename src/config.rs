//! Bridge configuration.
//!
//! Loaded from a JSON file. Every field is optional and falls back to the
//! value in [`BridgeConfig::default`], so `{}` is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub link: LinkConfig,
    pub reactive: ReactiveConfig,
    pub simulation: SimulationConfig,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub device: String,
    pub baud_rate: u32,
    /// Per-byte read budget while serving commands
    pub char_timeout_ms: u64,
    /// Per-byte read budget while the reactive loop runs
    pub poll_char_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactiveConfig {
    pub recovery_poll_interval_us: u64,
    pub recovery_max_polls: u32,
    /// Deepest allowed nesting of reactive runs
    pub max_loop_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulated time that passes per encoder read
    pub tick_ms: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            reactive: ReactiveConfig::default(),
            simulation: SimulationConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyS0".to_string(),
            baud_rate: 115_200,
            char_timeout_ms: 800,
            poll_char_timeout_ms: 10,
        }
    }
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            recovery_poll_interval_us: 1000,
            recovery_max_polls: 10_000,
            max_loop_depth: 8,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { tick_ms: 50 }
    }
}

impl BridgeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.link.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be non-zero"));
        }
        if self.link.device.is_empty() {
            return Err(ConfigError::Invalid("device must not be empty"));
        }
        if self.reactive.max_loop_depth == 0 {
            return Err(ConfigError::Invalid("max_loop_depth must be at least 1"));
        }
        Ok(())
    }
}
