// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state tracking.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connectivity status of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Device answered its last protocol query.
    Online,
    /// Device could not be reached.
    Offline,
    /// Device is reachable but misbehaving.
    Error,
    /// No query has completed yet.
    #[default]
    Unknown,
}

/// Last observed state of a device.
///
/// `power` is tri-state: `Some(true)`/`Some(false)` for a settled power
/// state, `None` while the device is in a transitional phase (warming,
/// cooling) or before the first query. `extra` is an open, driver-specific
/// attribute map (active input, lamp hours, raw protocol codes).
///
/// When `status` is not [`DeviceStatus::Online`], extras beyond a raw
/// diagnostic code are stale and must not be trusted as current.
///
/// # Examples
///
/// ```
/// use roomlink_lib::state::{DeviceState, DeviceStatus};
///
/// let state = DeviceState::online(Some(true)).with_extra("input", "31");
/// assert!(state.is_online());
/// assert_eq!(state.power, Some(true));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Connectivity status.
    pub status: DeviceStatus,
    /// Power flag; `None` means unknown or transitional.
    #[serde(default)]
    pub power: Option<bool>,
    /// Open driver-specific attributes.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, Value>,
}

impl DeviceState {
    /// Creates a state with everything unknown.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an online state with the given power flag.
    #[must_use]
    pub fn online(power: Option<bool>) -> Self {
        Self {
            status: DeviceStatus::Online,
            power,
            extra: HashMap::new(),
        }
    }

    /// Creates an offline state carrying no attributes.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            status: DeviceStatus::Offline,
            power: None,
            extra: HashMap::new(),
        }
    }

    /// Adds an extra attribute, builder-style.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Inserts an extra attribute.
    pub fn set_extra(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.extra.insert(key.into(), value.into());
    }

    /// Returns `true` if the device answered its last query.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.status == DeviceStatus::Online
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_unknown() {
        let state = DeviceState::new();
        assert_eq!(state.status, DeviceStatus::Unknown);
        assert_eq!(state.power, None);
        assert!(state.extra.is_empty());
    }

    #[test]
    fn offline_state_carries_nothing() {
        let state = DeviceState::offline();
        assert_eq!(state.status, DeviceStatus::Offline);
        assert_eq!(state.power, None);
        assert!(state.extra.is_empty());
    }

    #[test]
    fn builder_extras() {
        let state = DeviceState::online(Some(true))
            .with_extra("input", "31")
            .with_extra("lamp_hours", 1250);
        assert_eq!(state.extra["input"], "31");
        assert_eq!(state.extra["lamp_hours"], 1250);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&DeviceState::offline()).unwrap();
        assert_eq!(json, r#"{"status":"offline","power":null}"#);
    }

    #[test]
    fn state_round_trips_through_json() {
        let state = DeviceState::online(None).with_extra("raw_power", "2");
        let json = serde_json::to_string(&state).unwrap();
        let back: DeviceState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
