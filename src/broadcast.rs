// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broadcast fan-out to live room observers.
//!
//! The [`RoomBroadcaster`] keeps a set of observer channels per room and
//! pushes every device-state update on the bus to all observers of the
//! room the device belongs to. Observers attach, immediately get a full
//! snapshot of the room, then receive updates until they detach or their
//! channel dies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::event::{DeviceEvent, EventKind, SubscriptionId};
use crate::manager::RoomStateManager;
use crate::state::DeviceState;

/// Identifies one attached observer within its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Observer({})", self.0)
    }
}

/// Messages pushed to observers, in the wire shape the boundary layer
/// forwards as JSON.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastMessage {
    /// Full room state, delivered once on attach.
    Snapshot {
        /// Cached state of every device in the room.
        states: HashMap<String, DeviceState>,
    },
    /// One device's state was refreshed.
    DeviceStateUpdate {
        /// The affected device.
        device_id: String,
        /// Its new state.
        state: DeviceState,
        /// When the update was fanned out.
        timestamp: DateTime<Utc>,
    },
}

struct Observer {
    id: ObserverId,
    sender: mpsc::UnboundedSender<BroadcastMessage>,
}

/// Per-room fan-out of device-state updates.
///
/// Created once around a manager; subscribes itself to the manager's bus.
/// Delivery failure on a channel (the receiver was dropped) prunes exactly
/// that channel and never affects siblings in the same push.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use roomlink_lib::broadcast::RoomBroadcaster;
/// # async fn example(manager: Arc<roomlink_lib::manager::RoomStateManager>) -> roomlink_lib::Result<()> {
/// let broadcaster = RoomBroadcaster::new(Arc::clone(&manager));
/// let (observer_id, mut rx) = broadcaster.attach("aula-1")?;
/// let snapshot = rx.recv().await; // always the room snapshot first
/// // ...
/// broadcaster.detach("aula-1", observer_id);
/// # Ok(())
/// # }
/// ```
pub struct RoomBroadcaster {
    manager: Arc<RoomStateManager>,
    observers: Mutex<HashMap<String, Vec<Observer>>>,
    next_observer: AtomicU64,
    /// Bus subscription, released again on drop.
    subscription: OnceLock<SubscriptionId>,
}

impl RoomBroadcaster {
    /// Creates a broadcaster and subscribes it to the manager's bus.
    #[must_use]
    pub fn new(manager: Arc<RoomStateManager>) -> Arc<Self> {
        let broadcaster = Arc::new(Self {
            manager: Arc::clone(&manager),
            observers: Mutex::new(HashMap::new()),
            next_observer: AtomicU64::new(1),
            subscription: OnceLock::new(),
        });

        // The bus only holds a weak handle, so dropping the last Arc still
        // runs Drop and releases the subscription.
        let weak = Arc::downgrade(&broadcaster);
        let subscription =
            manager
                .event_bus()
                .subscribe(EventKind::StateUpdated, move |event| {
                    if let Some(broadcaster) = weak.upgrade()
                        && let DeviceEvent::StateUpdated { device_id, state } = event
                    {
                        broadcaster.fan_out(device_id, state);
                    }
                    Ok(())
                });
        let _ = broadcaster.subscription.set(subscription);

        broadcaster
    }

    /// Attaches an observer to a room.
    ///
    /// The observer immediately receives a [`BroadcastMessage::Snapshot`]
    /// built from the cached state of every device in the room, before any
    /// poll has to have completed.
    ///
    /// # Errors
    ///
    /// [`Error::RoomNotFound`] for an unknown room id.
    pub fn attach(
        &self,
        room_id: &str,
    ) -> Result<(ObserverId, mpsc::UnboundedReceiver<BroadcastMessage>)> {
        if self.manager.room(room_id).is_none() {
            return Err(Error::RoomNotFound(room_id.to_string()));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));

        let snapshot = BroadcastMessage::Snapshot {
            states: self.manager.room_states(room_id),
        };
        // The receiver is still in scope; this cannot fail.
        let _ = sender.send(snapshot);

        let mut observers = self.observers.lock();
        let room = observers.entry(room_id.to_string()).or_default();
        room.push(Observer { id, sender });
        tracing::info!(room_id = %room_id, observer = %id, total = room.len(), "observer attached");

        Ok((id, receiver))
    }

    /// Detaches an observer from a room. Idempotent.
    pub fn detach(&self, room_id: &str, id: ObserverId) {
        let mut observers = self.observers.lock();
        if let Some(room) = observers.get_mut(room_id) {
            let before = room.len();
            room.retain(|observer| observer.id != id);
            if room.len() != before {
                tracing::info!(room_id = %room_id, observer = %id, "observer detached");
            }
        }
    }

    /// Number of live observers attached to a room.
    #[must_use]
    pub fn observer_count(&self, room_id: &str) -> usize {
        self.observers.lock().get(room_id).map_or(0, Vec::len)
    }

    /// Pushes an update to every observer of every room containing the
    /// device, pruning channels whose receiver is gone.
    fn fan_out(&self, device_id: &str, state: &DeviceState) {
        let rooms: Vec<String> = self
            .manager
            .rooms()
            .filter(|room| room.devices.iter().any(|d| d.id == device_id))
            .map(|room| room.id.clone())
            .collect();
        if rooms.is_empty() {
            return;
        }

        let message = BroadcastMessage::DeviceStateUpdate {
            device_id: device_id.to_string(),
            state: state.clone(),
            timestamp: Utc::now(),
        };

        let mut observers = self.observers.lock();
        for room_id in rooms {
            let Some(room) = observers.get_mut(&room_id) else {
                continue;
            };
            room.retain(|observer| {
                let alive = observer.sender.send(message.clone()).is_ok();
                if !alive {
                    tracing::debug!(
                        room_id = %room_id,
                        observer = %observer.id,
                        "pruning dead observer channel"
                    );
                }
                alive
            });
        }
    }
}

impl Drop for RoomBroadcaster {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.get() {
            self.manager
                .event_bus()
                .unsubscribe(EventKind::StateUpdated, *subscription);
        }
    }
}

impl std::fmt::Debug for RoomBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let observers = self.observers.lock();
        f.debug_struct("RoomBroadcaster")
            .field(
                "observers",
                &observers
                    .iter()
                    .map(|(room, list)| (room.clone(), list.len()))
                    .collect::<HashMap<_, _>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_message_shape() {
        let message = BroadcastMessage::Snapshot {
            states: HashMap::from([("proj-1".to_string(), DeviceState::offline())]),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["states"]["proj-1"]["status"], "offline");
    }

    #[test]
    fn update_message_shape() {
        let message = BroadcastMessage::DeviceStateUpdate {
            device_id: "proj-1".to_string(),
            state: DeviceState::online(Some(true)),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "device_state_update");
        assert_eq!(json["device_id"], "proj-1");
        assert_eq!(json["state"]["power"], true);
        assert!(json["timestamp"].is_string());
    }
}
