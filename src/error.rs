// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `RoomLink` library.
//!
//! Two layers: [`DriverError`] covers everything that can go wrong while
//! talking to a device over the wire, and [`Error`] adds the registry-level
//! failures (lookups, configuration, unknown driver kinds).

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// A driver-level protocol or connectivity failure.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// Device was not found in the registry.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Room was not found in the registry.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// Scene was not found in the room.
    #[error("scene not found: {0}")]
    SceneNotFound(String),

    /// No driver is registered for the configured kind.
    #[error("unknown driver kind: {0}")]
    UnknownDriverKind(String),

    /// Configuration is invalid (duplicate ids, malformed settings, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Errors raised by a device driver during a protocol exchange.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The command name is not recognized by this driver.
    ///
    /// Raised before any network I/O happens.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Connection to the device failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A protocol exchange did not complete within the deadline.
    #[error("operation timed out after {0} ms")]
    Timeout(u64),

    /// The device answered with a protocol error code (`ERR1`..`ERR4`).
    #[error("device reported {0}")]
    Protocol(String),

    /// The device rejected the authentication digest.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The reply line could not be interpreted.
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// Underlying socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Returns `true` if this error means the device is unreachable
    /// rather than unwilling.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::Timeout(_) | Self::Io(_)
        )
    }
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_display() {
        let err = DriverError::Protocol("ERR3".to_string());
        assert_eq!(err.to_string(), "device reported ERR3");
    }

    #[test]
    fn error_from_driver_error() {
        let err: Error = DriverError::AuthenticationFailed.into();
        assert!(matches!(
            err,
            Error::Driver(DriverError::AuthenticationFailed)
        ));
        assert_eq!(err.to_string(), "driver error: authentication failed");
    }

    #[test]
    fn connectivity_classification() {
        assert!(DriverError::Timeout(5000).is_connectivity());
        assert!(DriverError::ConnectionFailed("refused".into()).is_connectivity());
        assert!(!DriverError::Protocol("ERR1".into()).is_connectivity());
        assert!(!DriverError::UnknownCommand("zoom".into()).is_connectivity());
    }

    #[test]
    fn lookup_error_display() {
        assert_eq!(
            Error::DeviceNotFound("proj-1".into()).to_string(),
            "device not found: proj-1"
        );
    }
}
