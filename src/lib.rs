// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `RoomLink` Lib - A Rust library to expose and control AV devices in rooms.
//!
//! This library provides the device-control runtime behind a room control
//! system: a uniform async driver abstraction with a PJLink class-1
//! implementation, a periodic polling loop that keeps cached device state
//! fresh, an in-process event bus, and a broadcast fan-out that pushes
//! state updates to live per-room observers.
//!
//! # Supported Features
//!
//! - **PJLink class 1**: power on/off, input selection, AV mute, power/
//!   input/lamp queries, optional MD5 challenge-response authentication
//! - **Polling**: concurrent per-device polls with failure isolation
//! - **Scenes**: named, ordered cross-device command batches
//! - **Fan-out**: per-room observer channels with snapshot-on-attach
//! - **Simulator**: an in-crate PJLink projector double for tests
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use roomlink_lib::broadcast::RoomBroadcaster;
//! use roomlink_lib::config::SystemConfig;
//! use roomlink_lib::driver::DriverRegistry;
//! use roomlink_lib::manager::RoomStateManager;
//!
//! #[tokio::main]
//! async fn main() -> roomlink_lib::Result<()> {
//!     // Configuration is typically deserialized from a file by the
//!     // embedding application.
//!     let config: SystemConfig = serde_json::from_str(r#"{
//!         "rooms": [{
//!             "id": "aula-1",
//!             "name": "Aula 1",
//!             "devices": [{
//!                 "id": "proj-1",
//!                 "name": "Projector",
//!                 "type": "projector",
//!                 "driver": "pjlink",
//!                 "settings": {"host": "10.0.0.20"}
//!             }]
//!         }]
//!     }"#).expect("valid config");
//!
//!     let registry = DriverRegistry::with_builtin();
//!     let manager = Arc::new(RoomStateManager::new(config, &registry)?);
//!     manager.start().await;
//!
//!     // Watch the room.
//!     let broadcaster = RoomBroadcaster::new(Arc::clone(&manager));
//!     let (observer, mut updates) = broadcaster.attach("aula-1")?;
//!     if let Some(message) = updates.recv().await {
//!         println!("snapshot: {}", serde_json::to_string(&message).unwrap());
//!     }
//!
//!     // Drive the projector.
//!     manager
//!         .send_command("proj-1", "power_on", &Default::default())
//!         .await?;
//!
//!     broadcaster.detach("aula-1", observer);
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod manager;
pub mod simulator;
pub mod state;

pub use broadcast::{BroadcastMessage, ObserverId, RoomBroadcaster};
pub use config::{DeviceConfig, Room, Scene, SceneAction, SystemConfig};
pub use driver::{CommandParams, DeviceDriver, DriverRegistry, PjlinkConfig, PjlinkDriver};
pub use error::{DriverError, Error, Result};
pub use event::{DeviceEvent, EventBus, EventKind, SubscriptionId};
pub use manager::{RoomStateManager, SceneActionResult};
pub use state::{DeviceState, DeviceStatus};
