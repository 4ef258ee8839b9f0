use crate::telemetry::{BeaconDecoder, BeaconLayout};
use serde::Deserialize;
use simplelog::LevelFilter;
use std::{path::PathBuf, str::FromStr, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path:?}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown log level {0:?}")]
    LogLevel(String),
    #[error("beacon layout: {0:?}")]
    BeaconLayout(anyhow::Error),
}

/// Harness settings, read from `config.toml`
///
/// ```toml
/// uart = "/dev/ttyUSB0"
/// baudrate = 115200
/// security_code = 0xBB0B_DEAD
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HarnessConfig {
    pub uart: String,
    pub baudrate: u32,
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub security_code: u32,
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// TOML beacon layout. The built-in layout is used when absent.
    pub beacon_layout: Option<PathBuf>,
}

fn default_log_path() -> PathBuf {
    "log".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_timeout_ms() -> u64 {
    5000
}

impl HarnessConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        Self::from_toml_str(&content)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn log_level(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.log_level).map_err(|_| ConfigError::LogLevel(self.log_level.clone()))
    }

    /// Loads and validates the configured beacon layout. Layout defects surface here, at
    /// startup, never while decoding.
    pub fn beacon_decoder(&self) -> Result<BeaconDecoder, ConfigError> {
        let layout = match &self.beacon_layout {
            Some(path) => BeaconLayout::from_file(path).map_err(ConfigError::BeaconLayout)?,
            None => BeaconLayout::default(),
        };
        layout.decoder().map_err(|e| ConfigError::BeaconLayout(e.into()))
    }
}
