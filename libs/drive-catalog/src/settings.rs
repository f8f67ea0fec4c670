//! Session settings persistence
//!
//! Mutable display state kept apart from the immutable channel definitions
//! and merged with them only at the display/persistence boundary. Stored
//! as a small JSON document keyed by channel name, plus window geometry
//! and the last-used serial port.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use errors::DriveResult;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-channel display flags, keyed by the channel's unique name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    #[serde(default)]
    pub active: bool,
    /// Plot against the secondary Y axis
    #[serde(default)]
    pub secondary_axis: bool,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    "#ffffff".to_string()
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            active: false,
            secondary_axis: false,
            color: default_color(),
        }
    }
}

/// Last window placement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowGeometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Everything that survives between sessions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default)]
    pub channels: HashMap<String, ChannelSettings>,
    #[serde(default)]
    pub last_port: Option<String>,
    #[serde(default)]
    pub window: Option<WindowGeometry>,
}

impl SessionSettings {
    /// Load settings from `path`; a missing file is a fresh session.
    pub fn load(path: &Path) -> DriveResult<Self> {
        if !path.exists() {
            debug!("no session settings at {}, starting fresh", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> DriveResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        debug!("session settings saved to {}", path.display());
        Ok(())
    }

    /// Settings for a channel, defaults if it has none yet.
    pub fn channel(&self, name: &str) -> ChannelSettings {
        self.channels.get(name).cloned().unwrap_or_default()
    }

    pub fn channel_mut(&mut self, name: &str) -> &mut ChannelSettings {
        self.channels.entry(name.to_string()).or_default()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_fresh_session() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SessionSettings::load(&dir.path().join("none.json")).unwrap();
        assert!(settings.channels.is_empty());
        assert!(settings.last_port.is_none());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut settings = SessionSettings::default();
        settings.channel_mut("Speed Feedback").active = true;
        settings.channel_mut("Speed Feedback").color = "#ff0000".to_string();
        settings.channel_mut("Bus Voltage").secondary_axis = true;
        settings.last_port = Some("/dev/ttyUSB1".to_string());
        settings.save(&path).unwrap();

        let loaded = SessionSettings::load(&path).unwrap();
        assert!(loaded.channel("Speed Feedback").active);
        assert_eq!(loaded.channel("Speed Feedback").color, "#ff0000");
        assert!(loaded.channel("Bus Voltage").secondary_axis);
        assert!(!loaded.channel("Bus Voltage").active);
        assert_eq!(loaded.last_port.as_deref(), Some("/dev/ttyUSB1"));
    }

    #[test]
    fn test_unknown_channel_gets_defaults() {
        let settings = SessionSettings::default();
        let channel = settings.channel("Torque Current");
        assert!(!channel.active);
        assert_eq!(channel.color, "#ffffff");
    }

    #[test]
    fn test_older_files_without_optional_fields_load() {
        let loaded: SessionSettings =
            serde_json::from_str(r#"{"channels":{"Speed Feedback":{"active":true}}}"#).unwrap();
        let channel = loaded.channel("Speed Feedback");
        assert!(channel.active);
        assert!(!channel.secondary_axis);
        assert_eq!(channel.color, "#ffffff");
    }
}
