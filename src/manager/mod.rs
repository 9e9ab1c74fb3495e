// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Room and device orchestration.
//!
//! The [`RoomStateManager`] owns the room registry and one driver instance
//! per configured device, keeps cached device state fresh through a
//! recurring concurrent poll, and publishes state updates on its
//! [`EventBus`](crate::event::EventBus).

mod room_manager;

pub use room_manager::{RoomStateManager, SceneActionResult};
