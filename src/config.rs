use std::path::Path;
use std::time::Duration;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::encoder::client::DEFAULT_INITIAL_TIMEOUT;
use crate::serial::protocol::DEFAULT_PUSH_INTERVAL_MS;

pub const DEFAULT_DEVICE: &str = "/dev/ttyACM0";
pub const DEFAULT_PULSES_PER_REVOLUTION: u32 = 2000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings for one encoder session and the code consuming its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Serial device path, e.g. `/dev/ttyACM0` or `COM3`
    pub device: String,
    /// Used to scale raw positions into revolutions, never sent to the device
    pub pulses_per_revolution: u32,
    /// Flip the sign of scaled values
    pub inverted: bool,
    pub push_interval_ms: u32,
    /// How long to wait for a line to start before polling the stop flag again
    pub initial_timeout_ms: u64,
    pub log_level: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            pulses_per_revolution: DEFAULT_PULSES_PER_REVOLUTION,
            inverted: false,
            push_interval_ms: DEFAULT_PUSH_INTERVAL_MS,
            initial_timeout_ms: DEFAULT_INITIAL_TIMEOUT.as_millis() as u64,
            log_level: "info".to_string(),
        }
    }
}

impl EncoderConfig {
    pub fn new(device: impl Into<String>) -> Self {
        Self { device: device.into(), ..Default::default() }
    }

    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        log::debug!("Loaded encoder config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.trim().is_empty() {
            return Err(ConfigError::Invalid("device must not be empty".to_string()));
        }
        if self.pulses_per_revolution == 0 {
            return Err(ConfigError::Invalid("pulses_per_revolution must be positive".to_string()));
        }
        if self.push_interval_ms == 0 {
            return Err(ConfigError::Invalid("push_interval_ms must be positive".to_string()));
        }
        if self.initial_timeout_ms == 0 {
            return Err(ConfigError::Invalid("initial_timeout_ms must be positive".to_string()));
        }
        self.level_filter()?;
        Ok(())
    }

    pub fn initial_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_timeout_ms)
    }

    pub fn level_filter(&self) -> Result<LevelFilter> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level {:?}", self.log_level)))
    }

    /// Scale a raw encoder position into revolutions
    pub fn revolutions(&self, value: i64) -> f64 {
        let turns = value as f64 / f64::from(self.pulses_per_revolution.max(1));
        if self.inverted {
            -turns
        } else {
            turns
        }
    }
}
