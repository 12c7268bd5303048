//! Rig configuration parameters
//!
//! All tunable parameters for one rig.  Loaded from a JSON file at start-up;
//! a missing file means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Longest serial read timeout accepted from configuration.
const MAX_READ_TIMEOUT_MS: u32 = 10_000;

/// Core rig configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    pub trial: TrialSettings,
    /// Light sensor / streaming device.
    pub light_sensor: SerialSettings,
    /// Ambient (temperature / pressure / humidity) module.
    pub ambient_sensor: SerialSettings,
    pub softcode: SoftCodeSettings,
    /// Where decoded telemetry is appended, one JSON record per line.
    pub telemetry_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialSettings {
    /// Abort a trial after this many transitions.
    pub max_transitions: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Device path, e.g. `/dev/ttyACM0`.
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Bound on every frame read (milliseconds)
    pub read_timeout_ms: u32,
    /// Streamed samples per batch-index marker
    pub batch_interval: u32,
}

impl SerialSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.read_timeout_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftCodeSettings {
    pub host: String,
    pub port: u16,
    /// OSC address pattern the code is sent to.
    pub address: String,
    /// Send from a worker thread instead of the trial loop.
    pub background: bool,
}

impl SoftCodeSettings {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 115_200,
            read_timeout_ms: 1000,
            batch_interval: 100,
        }
    }
}

impl Default for SoftCodeSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 7110,
            address: "/e".into(),
            background: false,
        }
    }
}

impl RigConfig {
    /// Load from `path`, falling back to defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e.kind())),
        };
        let config: Self =
            serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the rig misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for serial in [&self.light_sensor, &self.ambient_sensor] {
            if serial.baud_rate == 0 {
                return Err(ConfigError::ValidationFailed("baud_rate must be positive"));
            }
            if serial.read_timeout_ms == 0 || serial.read_timeout_ms > MAX_READ_TIMEOUT_MS {
                return Err(ConfigError::ValidationFailed(
                    "read_timeout_ms must be within 1..=10000",
                ));
            }
            if serial.batch_interval == 0 {
                return Err(ConfigError::ValidationFailed("batch_interval must be positive"));
            }
        }
        if self.softcode.port == 0 {
            return Err(ConfigError::ValidationFailed("softcode port must be non-zero"));
        }
        if !self.softcode.address.starts_with('/') {
            return Err(ConfigError::ValidationFailed(
                "softcode address must start with '/'",
            ));
        }
        if self.trial.max_transitions == Some(0) {
            return Err(ConfigError::ValidationFailed("max_transitions must be positive"));
        }
        Ok(())
    }
}
