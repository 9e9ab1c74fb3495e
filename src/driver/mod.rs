// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device driver abstraction.
//!
//! Every device kind implements [`DeviceDriver`]: a small capability
//! contract (connect, disconnect, state query, named commands) plus a
//! cached last-known [`DeviceState`] owned by the driver instance. The
//! manager talks to drivers exclusively through `Arc<dyn DeviceDriver>`.

mod pjlink;
mod registry;

pub use pjlink::{PJLINK_PORT, PjlinkConfig, PjlinkDriver};
pub(crate) use pjlink::auth_digest as pjlink_auth_digest;
pub use registry::{DriverFactory, DriverRegistry};

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DriverError;
use crate::state::DeviceState;

/// Parameters passed to [`DeviceDriver::send_command`].
pub type CommandParams = HashMap<String, Value>;

/// Capability contract implemented by every device driver.
///
/// One instance exists per configured device, created at startup and kept
/// for the process lifetime; drivers are reconnected, never recreated.
///
/// # Cache discipline
///
/// `get_state` performs a fresh protocol query and must not touch the
/// cache; `poll` is the one path that stores a query result. `connect`
/// records reachability (online/offline) in the cache. `send_command`
/// never writes the cache either way; a later poll reconciles it, so a
/// command that failed on the wire can never leave a state behind that
/// pretends it succeeded.
///
/// # Concurrency
///
/// A poll and a command may race on the same device. Implementations must
/// serialize their own protocol exchanges (the PJLink driver holds a
/// `tokio::sync::Mutex` across each full connect-send-receive-close
/// sequence).
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// The device identifier this driver was created for.
    fn device_id(&self) -> &str;

    /// Returns a copy of the cached last-known state.
    fn cached_state(&self) -> DeviceState;

    /// Replaces the cached state.
    ///
    /// Called by the provided [`poll`](Self::poll); not intended for
    /// external callers.
    fn store_state(&self, state: DeviceState);

    /// Establishes reachability.
    ///
    /// On success caches status online and returns `true`; on failure
    /// caches status offline and returns `false`. Ordinary connectivity
    /// failure is not an error.
    async fn connect(&self) -> bool;

    /// Releases held resources. Idempotent, never fails.
    async fn disconnect(&self);

    /// Queries the device and returns its authoritative current state.
    ///
    /// Does not update the cache.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] only for failures the driver cannot fold
    /// into the state itself; unreachability is reported as an offline
    /// state, not an error.
    async fn get_state(&self) -> Result<DeviceState, DriverError>;

    /// Queries the device and stores the result as the new cache.
    ///
    /// # Errors
    ///
    /// Propagates whatever [`get_state`](Self::get_state) raises; on error
    /// the cache is left untouched.
    async fn poll(&self) -> Result<DeviceState, DriverError> {
        let state = self.get_state().await?;
        self.store_state(state.clone());
        Ok(state)
    }

    /// Executes a named, driver-specific command.
    ///
    /// # Errors
    ///
    /// [`DriverError::UnknownCommand`] if the name is not recognized by
    /// this driver (raised before any network I/O); any other
    /// [`DriverError`] if the protocol exchange fails.
    async fn send_command(&self, command: &str, params: &CommandParams)
    -> Result<String, DriverError>;
}
