use serde::Deserialize;
use std::{path::Path, time::Duration};
use thiserror::Error;

use crate::LogViewMode;
#[cfg(feature = "mqtt")]
use crate::MqttStoreConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Yaml(#[from] serde_yml::Error),
}

/// Which remote store the dashboard mirrors.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreBackendConfig {
    #[default]
    Memory,
    #[cfg(feature = "mqtt")]
    Mqtt(MqttStoreConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub store: StoreBackendConfig,
    #[serde(default)]
    pub logs: LogViewMode,
    /// Seconds the event loop waits before reporting itself idle.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
}

fn default_idle_timeout() -> u64 {
    60
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            store: StoreBackendConfig::default(),
            logs: LogViewMode::default(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

impl DashboardConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout.max(1))
    }
}
