//! Application configuration
//!
//! Layered with figment: built-in defaults, then an optional YAML file,
//! then `DRIVETUNE_`-prefixed environment variables (nested keys separated
//! with `__`, e.g. `DRIVETUNE_SERIAL__BAUD_RATE`).

use std::path::{Path, PathBuf};

use drive_catalog::DriveModel;
use drive_link::SerialConfig;
use errors::{DriveError, DriveResult};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "drivetune.yaml";

/// Monitor loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Polling tick interval in milliseconds
    pub tick_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Selected drive model; picks the catalog tables
    pub model: DriveModel,
    pub serial: SerialConfig,
    pub monitor: MonitorConfig,
    /// Where per-channel display flags and window state persist
    pub settings_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: DriveModel::V6,
            serial: SerialConfig::default(),
            monitor: MonitorConfig::default(),
            settings_path: PathBuf::from("drivetune-session.json"),
        }
    }
}

impl AppConfig {
    /// Load configuration: defaults, then `path` (or `drivetune.yaml` if it
    /// exists), then environment overrides.
    pub fn load(path: Option<&Path>) -> DriveResult<Self> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Yaml::file(file))
            .merge(Env::prefixed("DRIVETUNE_").split("__"))
            .extract()
            .map_err(|e| DriveError::Configuration(e.to_string()))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.tick_interval_ms)
    }
}
