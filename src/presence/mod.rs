//! Device presence tracking
//!
//! The registry is rebuilt from the configured device list on every presence
//! cycle: everything starts offline, and only a client report fresher than the
//! online window flips a device to present. There is no carry-over of a
//! previous cycle's online state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::unifi::{normalize_mac, ClientEntry};

/// One tracked device from configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub mac: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub mac: String,
    pub name: String,
    pub is_online: bool,
}

/// Registry of tracked devices, in configuration order.
/// Its key set always equals the device-config key set; evaluation only
/// mutates the online flag.
#[derive(Debug, Clone, Default)]
pub struct PresenceRegistry {
    entries: Vec<PresenceEntry>,
}

impl PresenceRegistry {
    fn from_config(devices: &[DeviceConfig]) -> Self {
        let entries = devices
            .iter()
            .map(|d| PresenceEntry {
                mac: normalize_mac(&d.mac),
                name: d.name.clone(),
                is_online: false,
            })
            .collect();
        Self { entries }
    }

    fn mark_online(&mut self, mac: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.mac == mac) {
            entry.is_online = true;
        }
    }

    pub fn get(&self, mac: &str) -> Option<&PresenceEntry> {
        self.entries.iter().find(|e| e.mac == mac)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PresenceEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Debug representation committed to the log after each cycle
    pub fn to_log_value(&self) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "mac": e.mac,
                        "name": e.name,
                        "is_online": e.is_online,
                    })
                })
                .collect(),
        )
    }
}

/// Re-evaluate presence for one cycle.
/// A client counts as present when `now - last_seen < window_secs`.
pub fn evaluate(
    devices: &[DeviceConfig],
    clients: &[ClientEntry],
    window_secs: i64,
    now: i64,
) -> PresenceRegistry {
    let mut registry = PresenceRegistry::from_config(devices);

    for client in clients {
        let mac = normalize_mac(&client.mac);
        if registry.get(&mac).is_none() {
            continue;
        }

        let age = now - client.last_seen;
        if age < window_secs {
            registry.mark_online(&mac);
        }
    }

    registry
}
