// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device event types.

use serde::{Deserialize, Serialize};

use crate::state::DeviceState;

/// Event kind, used as the subscription key on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A poll delivered a fresh device state.
    StateUpdated,
    /// A device was connected or disconnected.
    ConnectionChanged,
}

/// Events published by the room state manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeviceEvent {
    /// A poll cycle refreshed this device's state.
    ///
    /// Published after every successful poll, not only on value changes;
    /// observers use it as a liveness signal as much as a delta.
    StateUpdated {
        /// The polled device.
        device_id: String,
        /// Its freshly observed state.
        state: DeviceState,
    },

    /// Device connectivity changed (startup connect, shutdown disconnect).
    ConnectionChanged {
        /// The affected device.
        device_id: String,
        /// Whether the device is now reachable.
        connected: bool,
        /// Failure detail when `connected` is false because of an error.
        error: Option<String>,
    },
}

impl DeviceEvent {
    /// Creates a state-updated event.
    #[must_use]
    pub fn state_updated(device_id: impl Into<String>, state: DeviceState) -> Self {
        Self::StateUpdated {
            device_id: device_id.into(),
            state,
        }
    }

    /// Creates a connected event.
    #[must_use]
    pub fn connected(device_id: impl Into<String>) -> Self {
        Self::ConnectionChanged {
            device_id: device_id.into(),
            connected: true,
            error: None,
        }
    }

    /// Creates a disconnected event, optionally carrying the failure.
    #[must_use]
    pub fn disconnected(device_id: impl Into<String>, error: Option<String>) -> Self {
        Self::ConnectionChanged {
            device_id: device_id.into(),
            connected: false,
            error,
        }
    }

    /// The kind this event is published under.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StateUpdated { .. } => EventKind::StateUpdated,
            Self::ConnectionChanged { .. } => EventKind::ConnectionChanged,
        }
    }

    /// The device this event concerns.
    #[must_use]
    pub fn device_id(&self) -> &str {
        match self {
            Self::StateUpdated { device_id, .. } | Self::ConnectionChanged { device_id, .. } => {
                device_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let update = DeviceEvent::state_updated("proj-1", DeviceState::new());
        assert_eq!(update.kind(), EventKind::StateUpdated);

        let conn = DeviceEvent::connected("proj-1");
        assert_eq!(conn.kind(), EventKind::ConnectionChanged);
    }

    #[test]
    fn device_id_extraction() {
        let event = DeviceEvent::disconnected("proj-2", Some("refused".into()));
        assert_eq!(event.device_id(), "proj-2");
    }
}
