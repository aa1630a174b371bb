//! Peripheral configuration
//!
//! Every field has a default matching the identifiers existing test centrals
//! expect, so an empty JSON object (or no file at all) yields a working
//! peripheral.

use crate::gatt::profile;
use crate::uuid::Uuid;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Notification period must be non-zero")]
    ZeroNotifyPeriod,

    #[error("Local name must not be empty")]
    EmptyLocalName,

    #[error("Invalid device id {0:?}")]
    InvalidDeviceId(String),
}

/// Peripheral configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralConfig {
    /// Local name put in the advertisement
    #[serde(default = "default_local_name")]
    pub local_name: String,
    /// Heartbeat period while a central is subscribed
    #[serde(default = "default_notify_period_ms")]
    pub notify_period_ms: u64,
    /// `deviceName` reported by the read-only characteristic
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// `deviceId` reported by the read-only characteristic
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Log filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            local_name: default_local_name(),
            notify_period_ms: default_notify_period_ms(),
            device_name: default_device_name(),
            device_id: default_device_id(),
            log_level: default_log_level(),
        }
    }
}

fn default_local_name() -> String {
    profile::LOCAL_NAME.to_string()
}
fn default_notify_period_ms() -> u64 {
    profile::NOTIFY_PERIOD.as_millis() as u64
}
fn default_device_name() -> String {
    profile::DEVICE_NAME.to_string()
}
fn default_device_id() -> String {
    profile::DEVICE_ID.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl PeripheralConfig {
    /// Loads and validates a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        debug!(path = %path.display(), "loaded peripheral config");
        Ok(config)
    }

    /// Checks the values the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.notify_period_ms == 0 {
            return Err(ConfigError::ZeroNotifyPeriod);
        }
        if self.local_name.is_empty() {
            return Err(ConfigError::EmptyLocalName);
        }
        if self.device_id.parse::<Uuid>().is_err() {
            return Err(ConfigError::InvalidDeviceId(self.device_id.clone()));
        }
        Ok(())
    }

    pub fn notify_period(&self) -> Duration {
        Duration::from_millis(self.notify_period_ms)
    }
}
