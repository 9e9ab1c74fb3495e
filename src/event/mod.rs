// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process event distribution.
//!
//! The [`EventBus`] decouples the polling loop from interested listeners
//! (chiefly the broadcast fan-out). Purely in-process, best-effort,
//! at-most-once per registered handler per publish.

mod device_event;
mod event_bus;

pub use device_event::{DeviceEvent, EventKind};
pub use event_bus::{EventBus, SubscriptionId};
