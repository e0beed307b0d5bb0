//! Configuration module
//!
//! Loaded fresh at the start of every sync cycle, so credential or device-list
//! edits take effect on the next trigger without a restart.

use serde::Deserialize;

use crate::error::{AgentError, Result};
use crate::presence::DeviceConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Controller endpoint and credentials
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_site")]
    pub site: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// Minutes since last_seen within which a device counts as present
    #[serde(default = "default_online_time")]
    pub online_time_minutes: u64,
    /// JSON-encoded ordered list of {"mac": ..., "name": ...} pairs
    #[serde(default = "default_devices")]
    pub devices: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_data_interval")]
    pub data_interval_secs: u64,
    #[serde(default = "default_presence_interval")]
    pub presence_interval_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: String::new(),
            password: String::new(),
            site: default_site(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            online_time_minutes: default_online_time(),
            devices: default_devices(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_interval_secs: default_data_interval(),
            presence_interval_secs: default_presence_interval(),
        }
    }
}

fn default_url() -> String {
    "https://192.168.1.10:8443".to_string()
}

fn default_site() -> String {
    "default".to_string()
}

fn default_online_time() -> u64 {
    15
}

fn default_devices() -> String {
    "[]".to_string()
}

fn default_data_interval() -> u64 {
    600
}

fn default_presence_interval() -> u64 {
    30
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("UNIFI_AGENT").separator("__"))
            .build()?;

        let config = settings
            .try_deserialize()
            .unwrap_or_else(|_| Self::default());

        Ok(config)
    }

    /// True once url, user and password are all set
    pub fn is_configured(&self) -> bool {
        !self.controller.url.is_empty()
            && !self.controller.username.is_empty()
            && !self.controller.password.is_empty()
    }

    /// Parse the JSON device list into the tracked-device universe.
    /// Hardware addresses are lowercased here, before any comparison.
    pub fn tracked_devices(&self) -> Result<Vec<DeviceConfig>> {
        let mut devices: Vec<DeviceConfig> = serde_json::from_str(&self.presence.devices)
            .map_err(|e| AgentError::Config(format!("invalid device list: {}", e)))?;
        for device in &mut devices {
            device.mac = device.mac.trim().to_lowercase();
        }
        Ok(devices)
    }

    /// Presence online window in seconds
    pub fn online_window_secs(&self) -> i64 {
        (self.presence.online_time_minutes * 60) as i64
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            presence: PresenceConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.controller.url, "https://192.168.1.10:8443");
        assert_eq!(config.controller.site, "default");
        assert_eq!(config.presence.online_time_minutes, 15);
        assert_eq!(config.sync.data_interval_secs, 600);
        assert_eq!(config.sync.presence_interval_secs, 30);
        assert!(!config.is_configured());
    }

    #[test]
    fn test_tracked_devices_normalizes_mac() {
        let mut config = Config::default();
        config.presence.devices =
            r#"[{"mac": "AA:BB:CC:DD:EE:FF", "name": "Phone"}]"#.to_string();

        let devices = config.tracked_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].mac, "aa:bb:cc:dd:ee:ff");
        assert_eq!(devices[0].name, "Phone");
    }

    #[test]
    fn test_tracked_devices_invalid_json() {
        let mut config = Config::default();
        config.presence.devices = "not json".to_string();
        assert!(config.tracked_devices().is_err());
    }

    #[test]
    fn test_online_window_secs() {
        let config = Config::default();
        assert_eq!(config.online_window_secs(), 900);
    }
}
