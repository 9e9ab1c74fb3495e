// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PJLink class-1 display/projector driver.
//!
//! PJLink is connectionless across commands: every exchange opens a fresh
//! TCP connection, reads the greeting, optionally answers the MD5
//! challenge, sends one `%1<CMD> <param>` line and reads one reply line.
//! Server lines are CR-terminated; client lines are CR-LF-terminated.
//!
//! A per-driver `tokio::sync::Mutex` serializes whole exchanges: the
//! challenge token is single-use per connection and interleaved
//! connections to the same endpoint are not defined behavior.

use std::io;

use md5::{Digest, Md5};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::Mutex;
use tokio::time::{Duration, timeout};

use crate::config::DeviceConfig;
use crate::error::{DriverError, Error};
use crate::state::{DeviceState, DeviceStatus};

use super::{CommandParams, DeviceDriver};

/// Well-known PJLink TCP port.
pub const PJLINK_PORT: u16 = 4352;

/// Fixed deadline for every network step of an exchange.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for a PJLink device.
///
/// Deserialized from the `settings` map of a
/// [`DeviceConfig`](crate::config::DeviceConfig).
#[derive(Debug, Clone, Deserialize)]
pub struct PjlinkConfig {
    /// Hostname or IP address.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret for challenge-response authentication.
    #[serde(default)]
    pub password: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    PJLINK_PORT
}

impl Default for PjlinkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: PJLINK_PORT,
            password: None,
        }
    }
}

/// Driver speaking PJLink class 1 over TCP.
pub struct PjlinkDriver {
    device_id: String,
    config: PjlinkConfig,
    /// Last-known state; written only by `connect` and `poll`.
    cache: RwLock<DeviceState>,
    /// Serializes protocol exchanges for this device.
    exchange_lock: Mutex<()>,
}

impl PjlinkDriver {
    /// Creates a driver from explicit connection settings.
    #[must_use]
    pub fn new(device_id: impl Into<String>, config: PjlinkConfig) -> Self {
        Self {
            device_id: device_id.into(),
            config,
            cache: RwLock::new(DeviceState::new()),
            exchange_lock: Mutex::new(()),
        }
    }

    /// Creates a driver from a device configuration entry.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] if the settings map does not
    /// deserialize into a [`PjlinkConfig`].
    pub fn from_config(config: &DeviceConfig) -> Result<Self, Error> {
        let settings = Value::Object(config.settings.clone().into_iter().collect());
        let pjlink: PjlinkConfig = serde_json::from_value(settings).map_err(|err| {
            Error::InvalidConfiguration(format!("device {}: {err}", config.id))
        })?;
        Ok(Self::new(config.id.clone(), pjlink))
    }

    /// Runs one full `%1<CMD> <param>` exchange and returns the decoded
    /// reply parameter.
    async fn command(&self, cmd: &str, param: &str) -> Result<String, DriverError> {
        let raw = self.send_raw(&format!("%1{cmd} {param}")).await?;
        if raw == "PJLINK ERRA" {
            return Err(DriverError::AuthenticationFailed);
        }
        classify_reply(strip_echo(&raw, cmd)).map(str::to_string)
    }

    /// One connection, one command, one reply.
    async fn send_raw(&self, message: &str) -> Result<String, DriverError> {
        let _guard = self.exchange_lock.lock().await;

        // Socket halves are dropped on every path out of this block, so
        // the connection is closed before the call returns.
        let stream = match timeout(
            EXCHANGE_TIMEOUT,
            TcpStream::connect((self.config.host.as_str(), self.config.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => return Err(DriverError::ConnectionFailed(err.to_string())),
            Err(_) => return Err(timeout_error()),
        };

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let greeting = read_cr_line(&mut reader).await?;
        let prefix = match auth_token(&greeting) {
            Some(token) => match &self.config.password {
                Some(password) => auth_digest(token, password),
                None => {
                    tracing::warn!(
                        device_id = %self.device_id,
                        host = %self.config.host,
                        "device requested authentication but no password is configured; \
                         sending command unauthenticated"
                    );
                    String::new()
                }
            },
            None => String::new(),
        };

        let payload = format!("{prefix}{message}\r\n");
        io_deadline(write_half.write_all(payload.as_bytes())).await?;
        io_deadline(write_half.flush()).await?;

        read_cr_line(&mut reader).await
    }
}

#[async_trait::async_trait]
impl DeviceDriver for PjlinkDriver {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn cached_state(&self) -> DeviceState {
        self.cache.read().clone()
    }

    fn store_state(&self, state: DeviceState) {
        *self.cache.write() = state;
    }

    async fn connect(&self) -> bool {
        match self.command("NAME", "?").await {
            Ok(name) => {
                self.cache.write().status = DeviceStatus::Online;
                tracing::info!(
                    device_id = %self.device_id,
                    host = %self.config.host,
                    port = self.config.port,
                    name = %name,
                    "PJLink device connected"
                );
                true
            }
            Err(err) => {
                self.cache.write().status = DeviceStatus::Offline;
                tracing::warn!(
                    device_id = %self.device_id,
                    host = %self.config.host,
                    error = %err,
                    "PJLink connect failed"
                );
                false
            }
        }
    }

    async fn disconnect(&self) {
        // Connectionless protocol: nothing is held between exchanges.
    }

    async fn get_state(&self) -> Result<DeviceState, DriverError> {
        let code = match self.command("POWR", "?").await {
            Ok(code) => code,
            Err(err) => {
                tracing::debug!(
                    device_id = %self.device_id,
                    error = %err,
                    "power query failed"
                );
                return Ok(DeviceState::offline());
            }
        };

        let power = decode_power(&code);
        let mut state = DeviceState::online(power).with_extra("raw_power", code);

        // Only a fully powered-on device answers input/lamp queries
        // meaningfully. Each sub-query may fail on its own; the attribute
        // is then simply absent.
        if power == Some(true) {
            match self.command("INPT", "?").await {
                Ok(input) => state.set_extra("input", input),
                Err(err) => {
                    tracing::debug!(device_id = %self.device_id, error = %err, "input query failed");
                }
            }
            match self.command("LAMP", "?").await {
                Ok(lamp) => {
                    if let Some(hours) = parse_lamp_hours(&lamp) {
                        state.set_extra("lamp_hours", hours);
                    }
                }
                Err(err) => {
                    tracing::debug!(device_id = %self.device_id, error = %err, "lamp query failed");
                }
            }
        }

        Ok(state)
    }

    async fn send_command(
        &self,
        command: &str,
        params: &CommandParams,
    ) -> Result<String, DriverError> {
        match command {
            "power_on" => self.command("POWR", "1").await,
            "power_off" => self.command("POWR", "0").await,
            "query_power" => self.command("POWR", "?").await,
            "input" => {
                let input = params
                    .get("input")
                    .map_or_else(|| "31".to_string(), param_text);
                self.command("INPT", &input).await
            }
            "mute_on" => self.command("AVMT", "31").await,
            "mute_off" => self.command("AVMT", "30").await,
            other => Err(DriverError::UnknownCommand(other.to_string())),
        }
    }
}

impl std::fmt::Debug for PjlinkDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PjlinkDriver")
            .field("device_id", &self.device_id)
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("authenticated", &self.config.password.is_some())
            .finish_non_exhaustive()
    }
}

/// Extracts the challenge token from a version-1 greeting.
///
/// `PJLINK 1 <token>` carries a token; `PJLINK 0` does not.
fn auth_token(greeting: &str) -> Option<&str> {
    let mut fields = greeting.split_whitespace();
    if fields.next() != Some("PJLINK") || fields.next() != Some("1") {
        return None;
    }
    fields.next()
}

/// Hex-encoded MD5 of token ++ password, as the protocol mandates.
///
/// MD5 is cryptographically broken; it is kept solely for wire
/// compatibility with PJLink class 1.
pub(crate) fn auth_digest(token: &str, password: &str) -> String {
    let digest = Md5::digest(format!("{token}{password}").as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Strips the `%1<CMD>=` echo prefix from a reply line, if present.
fn strip_echo<'a>(raw: &'a str, cmd: &str) -> &'a str {
    let prefix = format!("%1{cmd}=");
    raw.strip_prefix(&prefix).unwrap_or(raw)
}

/// Maps an `ERRn`/`ERRA` reply parameter to an error, passes values through.
fn classify_reply(body: &str) -> Result<&str, DriverError> {
    match body {
        "ERRA" => Err(DriverError::AuthenticationFailed),
        "ERR1" | "ERR2" | "ERR3" | "ERR4" => Err(DriverError::Protocol(body.to_string())),
        value => Ok(value),
    }
}

/// Decodes a POWR status code into the tri-state power flag.
///
/// `2` (warming) and `3` (cooling) are transitional and decode to unknown.
fn decode_power(code: &str) -> Option<bool> {
    match code {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

/// First field of a `LAMP ?` reply is the cumulative lamp hours.
fn parse_lamp_hours(reply: &str) -> Option<u64> {
    reply.split_whitespace().next()?.parse().ok()
}

fn param_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn timeout_error() -> DriverError {
    DriverError::Timeout(u64::try_from(EXCHANGE_TIMEOUT.as_millis()).unwrap_or(u64::MAX))
}

async fn io_deadline<T>(
    fut: impl Future<Output = io::Result<T>>,
) -> Result<T, DriverError> {
    match timeout(EXCHANGE_TIMEOUT, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(DriverError::Io(err)),
        Err(_) => Err(timeout_error()),
    }
}

/// Reads one CR-terminated line and trims framing bytes.
///
/// PJLink servers terminate with a bare CR; reading to LF would stall on
/// a compliant endpoint.
async fn read_cr_line(reader: &mut BufReader<OwnedReadHalf>) -> Result<String, DriverError> {
    let mut buf = Vec::new();
    let n = io_deadline(reader.read_until(b'\r', &mut buf)).await?;
    if n == 0 {
        return Err(DriverError::ConnectionFailed(
            "connection closed by device".to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&buf).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn greeting_without_auth_has_no_token() {
        assert_eq!(auth_token("PJLINK 0"), None);
        assert_eq!(auth_token("PJLINK 1"), None);
        assert_eq!(auth_token("garbage"), None);
    }

    #[test]
    fn greeting_with_auth_yields_token() {
        assert_eq!(auth_token("PJLINK 1 abc123"), Some("abc123"));
    }

    #[test]
    fn digest_matches_protocol_reference() {
        // md5("abc123" ++ "JBMIaeJGn")
        assert_eq!(
            auth_digest("abc123", "JBMIaeJGn"),
            "cd4a1412663f4e6b1c368f9f286582dc"
        );
    }

    #[test]
    fn echo_prefix_is_stripped() {
        assert_eq!(strip_echo("%1POWR=1", "POWR"), "1");
        assert_eq!(strip_echo("%1LAMP=1250 1", "LAMP"), "1250 1");
        // Unexpected shapes pass through untouched.
        assert_eq!(strip_echo("PJLINK ERRA", "POWR"), "PJLINK ERRA");
    }

    #[test]
    fn power_codes_decode_tri_state() {
        assert_eq!(decode_power("0"), Some(false));
        assert_eq!(decode_power("1"), Some(true));
        assert_eq!(decode_power("2"), None);
        assert_eq!(decode_power("3"), None);
    }

    #[test]
    fn error_replies_classify() {
        assert!(matches!(
            classify_reply("ERR2"),
            Err(DriverError::Protocol(code)) if code == "ERR2"
        ));
        assert!(matches!(
            classify_reply("ERRA"),
            Err(DriverError::AuthenticationFailed)
        ));
        assert_eq!(classify_reply("OK").unwrap(), "OK");
        assert_eq!(classify_reply("31").unwrap(), "31");
    }

    #[test]
    fn lamp_hours_parse_first_field() {
        assert_eq!(parse_lamp_hours("1250 1"), Some(1250));
        assert_eq!(parse_lamp_hours("garbage"), None);
        assert_eq!(parse_lamp_hours(""), None);
    }

    #[test]
    fn config_defaults() {
        let config: PjlinkConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, PJLINK_PORT);
        assert_eq!(config.password, None);
    }

    #[test]
    fn from_config_rejects_bad_settings() {
        let device = DeviceConfig {
            id: "proj-1".into(),
            name: "Projector".into(),
            device_type: "projector".into(),
            driver: "pjlink".into(),
            settings: HashMap::from([("port".to_string(), Value::from("not-a-port"))]),
        };
        assert!(matches!(
            PjlinkDriver::from_config(&device),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn unknown_command_fails_without_network() {
        // Host that would hang if contacted; the error must come back
        // immediately, proving no I/O was attempted.
        let driver = PjlinkDriver::new(
            "proj-1",
            PjlinkConfig {
                host: "203.0.113.1".into(),
                ..PjlinkConfig::default()
            },
        );

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            driver.send_command("focus", &CommandParams::new()),
        )
        .await
        .expect("must not touch the network");

        assert!(matches!(
            result,
            Err(DriverError::UnknownCommand(name)) if name == "focus"
        ));
    }

    #[tokio::test]
    async fn unreachable_device_reports_offline_state() {
        // Port 1 on localhost is refused, not filtered, so this is fast.
        let driver = PjlinkDriver::new(
            "proj-1",
            PjlinkConfig {
                host: "127.0.0.1".into(),
                port: 1,
                ..PjlinkConfig::default()
            },
        );

        let state = driver.get_state().await.unwrap();
        assert_eq!(state.status, DeviceStatus::Offline);
        assert_eq!(state.power, None);
        assert!(state.extra.is_empty());
    }

    #[tokio::test]
    async fn poll_replaces_cache_verbatim() {
        let driver = PjlinkDriver::new(
            "proj-1",
            PjlinkConfig {
                host: "127.0.0.1".into(),
                port: 1,
                ..PjlinkConfig::default()
            },
        );
        // Seed the cache with something that must not survive a poll.
        driver.store_state(DeviceState::online(Some(true)).with_extra("input", "31"));

        let polled = driver.poll().await.unwrap();
        assert_eq!(driver.cached_state(), polled);
        assert_eq!(polled.status, DeviceStatus::Offline);
    }
}
