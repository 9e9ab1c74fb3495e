// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver kind registry.
//!
//! Maps a driver kind string (the `driver` field of a
//! [`DeviceConfig`](crate::config::DeviceConfig)) to a constructor. The
//! registry is plain owned state: build it, hand it to the manager, done.
//! No ambient globals.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DeviceConfig;
use crate::error::{Error, Result};

use super::{DeviceDriver, PjlinkDriver};

/// Constructor for one driver kind.
pub type DriverFactory =
    Box<dyn Fn(&DeviceConfig) -> Result<Arc<dyn DeviceDriver>> + Send + Sync>;

/// Lookup table from driver kind to constructor.
///
/// # Examples
///
/// ```
/// use roomlink_lib::driver::DriverRegistry;
///
/// let registry = DriverRegistry::with_builtin();
/// assert!(registry.contains("pjlink"));
/// ```
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Creates a registry with all built-in drivers registered.
    ///
    /// Currently that is `"pjlink"`.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("pjlink", |config| {
            Ok(Arc::new(PjlinkDriver::from_config(config)?) as Arc<dyn DeviceDriver>)
        });
        registry
    }

    /// Registers a constructor for a driver kind, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&DeviceConfig) -> Result<Arc<dyn DeviceDriver>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    /// Returns `true` if a constructor is registered for the kind.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Constructs a driver for the given device configuration.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownDriverKind`] if no constructor is registered for
    /// `config.driver`; otherwise whatever the constructor raises.
    pub fn build(&self, config: &DeviceConfig) -> Result<Arc<dyn DeviceDriver>> {
        let factory = self
            .factories
            .get(&config.driver)
            .ok_or_else(|| Error::UnknownDriverKind(config.driver.clone()))?;
        factory(config)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pjlink_config() -> DeviceConfig {
        DeviceConfig {
            id: "proj-1".into(),
            name: "Projector".into(),
            device_type: "projector".into(),
            driver: "pjlink".into(),
            settings: HashMap::new(),
        }
    }

    #[test]
    fn builtin_registry_builds_pjlink() {
        let registry = DriverRegistry::with_builtin();
        let driver = registry.build(&pjlink_config()).unwrap();
        assert_eq!(driver.device_id(), "proj-1");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let registry = DriverRegistry::with_builtin();
        let mut config = pjlink_config();
        config.driver = "dmx".into();

        let err = registry.build(&config).map(|_| ()).unwrap_err();
        assert!(matches!(err, Error::UnknownDriverKind(kind) if kind == "dmx"));
    }

    #[test]
    fn empty_registry_knows_nothing() {
        let registry = DriverRegistry::new();
        assert!(!registry.contains("pjlink"));
    }
}
