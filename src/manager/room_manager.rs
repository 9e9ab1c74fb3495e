// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Room state manager: registries, polling loop, scene execution.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Duration, MissedTickBehavior, timeout};

use crate::config::{Room, SystemConfig};
use crate::driver::{CommandParams, DeviceDriver, DriverRegistry};
use crate::error::{Error, Result};
use crate::event::{DeviceEvent, EventBus};
use crate::state::DeviceState;

/// Bounded effort given to each driver's disconnect during shutdown.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of one scene action.
#[derive(Debug, Clone, Serialize)]
pub struct SceneActionResult {
    /// Target device.
    pub device: String,
    /// Command that was attempted.
    pub command: String,
    /// Whether it succeeded.
    pub ok: bool,
    /// Failure detail when `ok` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Owns the room registry and all driver instances.
///
/// Both registries are populated once in [`new`](Self::new) and only read
/// afterwards, so lookups are plain map reads with no locking. Driver
/// instances live for the process lifetime; they are reconnected on later
/// polls, never recreated.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use roomlink_lib::config::SystemConfig;
/// use roomlink_lib::driver::DriverRegistry;
/// use roomlink_lib::manager::RoomStateManager;
///
/// # async fn example(config: SystemConfig) -> roomlink_lib::Result<()> {
/// let registry = DriverRegistry::with_builtin();
/// let manager = Arc::new(RoomStateManager::new(config, &registry)?);
/// manager.start().await;
/// // ...
/// manager.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct RoomStateManager {
    rooms: HashMap<String, Room>,
    /// Room ids in configuration order, for stable listing.
    room_order: Vec<String>,
    devices: HashMap<String, Arc<dyn DeviceDriver>>,
    event_bus: EventBus,
    poll_interval: Duration,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl RoomStateManager {
    /// Builds the registries and one driver per configured device.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] on a zero poll interval or on
    /// duplicate room or device ids;
    /// [`Error::UnknownDriverKind`] or a constructor error if a device's
    /// driver cannot be built.
    pub fn new(config: SystemConfig, registry: &DriverRegistry) -> Result<Self> {
        // tokio::time::interval panics on a zero period; a panicking poll
        // task would die silently inside its detached handle.
        if config.poll_interval_secs == 0 {
            return Err(Error::InvalidConfiguration(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }

        let mut rooms = HashMap::new();
        let mut room_order = Vec::with_capacity(config.rooms.len());
        let mut devices: HashMap<String, Arc<dyn DeviceDriver>> = HashMap::new();

        for room in config.rooms {
            for device in &room.devices {
                if devices.contains_key(&device.id) {
                    return Err(Error::InvalidConfiguration(format!(
                        "duplicate device id: {}",
                        device.id
                    )));
                }
                devices.insert(device.id.clone(), registry.build(device)?);
            }

            let room_id = room.id.clone();
            if rooms.insert(room_id.clone(), room).is_some() {
                return Err(Error::InvalidConfiguration(format!(
                    "duplicate room id: {room_id}"
                )));
            }
            room_order.push(room_id);
        }

        Ok(Self {
            rooms,
            room_order,
            devices,
            event_bus: EventBus::new(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            poll_task: Mutex::new(None),
        })
    }

    /// Connects every driver and starts the recurring poll task.
    ///
    /// A connect failure is logged and published; the device stays
    /// registered as offline so later polls keep attempting it. The first
    /// poll cycle runs immediately, then every poll interval.
    pub async fn start(self: &Arc<Self>) {
        for (device_id, driver) in &self.devices {
            if driver.connect().await {
                self.event_bus.publish(&DeviceEvent::connected(device_id));
            } else {
                self.event_bus
                    .publish(&DeviceEvent::disconnected(device_id, None));
            }
        }

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.poll_all().await;
            }
        });
        *self.poll_task.lock() = Some(handle);

        tracing::info!(
            rooms = self.rooms.len(),
            devices = self.devices.len(),
            poll_interval_secs = self.poll_interval.as_secs(),
            "room state manager started"
        );
    }

    /// Runs one poll cycle over every registered driver.
    ///
    /// Devices are polled concurrently and joined with per-device error
    /// capture: one failing or slow device never delays or fails the
    /// others. Each successful poll publishes a
    /// [`DeviceEvent::StateUpdated`]; a failed poll is logged and publishes
    /// nothing.
    pub async fn poll_all(&self) {
        let mut polls = JoinSet::new();
        for (device_id, driver) in &self.devices {
            let device_id = device_id.clone();
            let driver = Arc::clone(driver);
            polls.spawn(async move { (device_id, driver.poll().await) });
        }

        while let Some(joined) = polls.join_next().await {
            match joined {
                Ok((device_id, Ok(state))) => {
                    self.event_bus
                        .publish(&DeviceEvent::state_updated(device_id, state));
                }
                Ok((device_id, Err(err))) => {
                    tracing::debug!(device_id = %device_id, error = %err, "poll failed");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "poll task failed");
                }
            }
        }
    }

    /// Stops the poll task and disconnects every driver with bounded effort.
    ///
    /// A disconnect that hangs past its deadline is logged and abandoned;
    /// shutdown always completes.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.poll_task.lock().take() {
            handle.abort();
        }

        for (device_id, driver) in &self.devices {
            if timeout(DISCONNECT_TIMEOUT, driver.disconnect()).await.is_ok() {
                self.event_bus
                    .publish(&DeviceEvent::disconnected(device_id, None));
            } else {
                tracing::warn!(device_id = %device_id, "disconnect did not finish in time");
            }
        }

        tracing::info!("room state manager stopped");
    }

    /// The bus this manager publishes on.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Looks up a room by id.
    #[must_use]
    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// All rooms, in configuration order.
    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.room_order.iter().filter_map(|id| self.rooms.get(id))
    }

    /// Looks up a device driver by device id.
    #[must_use]
    pub fn device(&self, device_id: &str) -> Option<Arc<dyn DeviceDriver>> {
        self.devices.get(device_id).map(Arc::clone)
    }

    /// All registered device ids.
    #[must_use]
    pub fn device_ids(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    /// Device ids belonging to a room; empty for an unknown room.
    #[must_use]
    pub fn room_device_ids(&self, room_id: &str) -> Vec<String> {
        self.rooms.get(room_id).map_or_else(Vec::new, |room| {
            room.devices.iter().map(|d| d.id.clone()).collect()
        })
    }

    /// Cached state of every device in a room.
    #[must_use]
    pub fn room_states(&self, room_id: &str) -> HashMap<String, DeviceState> {
        self.room_device_ids(room_id)
            .into_iter()
            .filter_map(|device_id| {
                let state = self.devices.get(&device_id)?.cached_state();
                Some((device_id, state))
            })
            .collect()
    }

    /// Dispatches a command to a device.
    ///
    /// # Errors
    ///
    /// [`Error::DeviceNotFound`] for an unknown device id; otherwise the
    /// driver's failure.
    pub async fn send_command(
        &self,
        device_id: &str,
        command: &str,
        params: &CommandParams,
    ) -> Result<String> {
        let driver = self
            .device(device_id)
            .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))?;
        Ok(driver.send_command(command, params).await?)
    }

    /// Executes a room scene, action by action, capturing per-action
    /// failures instead of aborting the batch.
    ///
    /// # Errors
    ///
    /// [`Error::RoomNotFound`] or [`Error::SceneNotFound`] when the scene
    /// cannot be resolved; individual action failures are reported in the
    /// returned results, not as an error.
    pub async fn run_scene(
        &self,
        room_id: &str,
        scene_name: &str,
    ) -> Result<Vec<SceneActionResult>> {
        let room = self
            .room(room_id)
            .ok_or_else(|| Error::RoomNotFound(room_id.to_string()))?;
        let scene = room
            .scene(scene_name)
            .ok_or_else(|| Error::SceneNotFound(scene_name.to_string()))?;

        let mut results = Vec::with_capacity(scene.actions.len());
        for action in &scene.actions {
            let outcome = self
                .send_command(&action.device, &action.command, &action.params)
                .await;
            if let Err(err) = &outcome {
                tracing::warn!(
                    room_id = %room_id,
                    scene = %scene_name,
                    device_id = %action.device,
                    command = %action.command,
                    error = %err,
                    "scene action failed"
                );
            }
            results.push(SceneActionResult {
                device: action.device.clone(),
                command: action.command.clone(),
                ok: outcome.is_ok(),
                error: outcome.err().map(|e| e.to_string()),
            });
        }
        Ok(results)
    }
}

impl std::fmt::Debug for RoomStateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomStateManager")
            .field("rooms", &self.room_order)
            .field("devices", &self.devices.keys().collect::<Vec<_>>())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
