// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Static configuration model: rooms, devices, scenes.
//!
//! These types describe the system as declared by the operator. They are
//! deserialized once at startup by the embedding application (file loading
//! itself is not this crate's concern) and are immutable afterwards: the
//! [`RoomStateManager`](crate::manager::RoomStateManager) takes ownership
//! and only ever reads them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default poll interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Root configuration: poll interval plus all rooms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Seconds between poll cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// All configured rooms.
    #[serde(default)]
    pub rooms: Vec<Room>,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            rooms: Vec::new(),
        }
    }
}

/// A physical room with its devices and scenes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    /// Room identifier, unique across the system.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Devices installed in this room.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    /// Named command batches for this room.
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

impl Room {
    /// Looks up a scene by name.
    #[must_use]
    pub fn scene(&self, name: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.name == name)
    }
}

/// Configuration for one device.
///
/// `driver` selects the driver kind (e.g. `"pjlink"`); `settings` is the
/// driver-specific mapping (host, port, credentials) that the selected
/// driver interprets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device identifier, unique across the whole system.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Declared device type (e.g. `"projector"`).
    #[serde(rename = "type")]
    pub device_type: String,
    /// Driver kind selector.
    pub driver: String,
    /// Driver-specific settings.
    #[serde(default)]
    pub settings: HashMap<String, Value>,
}

/// A named, ordered batch of cross-device commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    /// Scene name, unique within its room.
    pub name: String,
    /// Actions executed in order.
    #[serde(default)]
    pub actions: Vec<SceneAction>,
}

/// One step of a scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneAction {
    /// Target device identifier.
    pub device: String,
    /// Driver command name.
    pub command: String,
    /// Command parameters.
    #[serde(default)]
    pub params: HashMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "poll_interval_secs": 5,
            "rooms": [{
                "id": "aula-1",
                "name": "Aula 1",
                "devices": [{
                    "id": "proj-1",
                    "name": "Projector",
                    "type": "projector",
                    "driver": "pjlink",
                    "settings": {"host": "10.0.0.20", "password": "secret"}
                }],
                "scenes": [{
                    "name": "presentation",
                    "actions": [
                        {"device": "proj-1", "command": "power_on"},
                        {"device": "proj-1", "command": "input", "params": {"input": "32"}}
                    ]
                }]
            }]
        }"#
    }

    #[test]
    fn deserializes_full_config() {
        let config: SystemConfig = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.rooms.len(), 1);

        let room = &config.rooms[0];
        assert_eq!(room.devices[0].driver, "pjlink");
        assert_eq!(room.devices[0].settings["host"], "10.0.0.20");

        let scene = room.scene("presentation").unwrap();
        assert_eq!(scene.actions.len(), 2);
        assert_eq!(scene.actions[1].params["input"], "32");
    }

    #[test]
    fn poll_interval_defaults() {
        let config: SystemConfig = serde_json::from_str(r#"{"rooms": []}"#).unwrap();
        assert_eq!(config.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
    }

    #[test]
    fn missing_scene_is_none() {
        let config: SystemConfig = serde_json::from_str(sample_json()).unwrap();
        assert!(config.rooms[0].scene("movie-night").is_none());
    }
}
