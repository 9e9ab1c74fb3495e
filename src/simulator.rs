// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PJLink projector simulator.
//!
//! A minimal server-side double of the wire protocol, used to exercise the
//! driver against protocol edge cases without real hardware: optional
//! authenticated handshake, one command per connection, and power
//! transitions that take real time (warming before on, cooling before
//! off). Input changes are rejected while the projector is not fully on.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};

use crate::driver::pjlink_auth_digest;

/// How long a client may take to send its command line.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunables for a simulated projector.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Reported by `NAME ?`.
    pub name: String,
    /// When set, the simulator issues a challenge and verifies digests.
    pub password: Option<String>,
    /// Time spent warming before the projector reports fully on.
    pub warm_up: Duration,
    /// Time spent cooling before the projector reports fully off.
    pub cool_down: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            name: "Sim Projector".to_string(),
            password: None,
            warm_up: Duration::from_secs(3),
            cool_down: Duration::from_secs(5),
        }
    }
}

/// POWR status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PowerCode {
    Off,
    On,
    Warming,
    Cooling,
}

impl PowerCode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Off => "0",
            Self::On => "1",
            Self::Warming => "2",
            Self::Cooling => "3",
        }
    }
}

struct SimState {
    power: PowerCode,
    input: String,
    avmt: String,
    lamp_hours: u64,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            power: PowerCode::Off,
            input: "31".to_string(),
            avmt: "30".to_string(),
            lamp_hours: 1250,
        }
    }
}

struct Shared {
    config: SimulatorConfig,
    state: Mutex<SimState>,
}

/// A running simulated projector.
///
/// # Examples
///
/// ```no_run
/// use roomlink_lib::simulator::{PjlinkSimulator, SimulatorConfig};
///
/// # async fn example() -> std::io::Result<()> {
/// let sim = PjlinkSimulator::bind("127.0.0.1:0", SimulatorConfig::default()).await?;
/// println!("simulated projector on {}", sim.local_addr());
/// # Ok(())
/// # }
/// ```
pub struct PjlinkSimulator {
    local_addr: SocketAddr,
    shared: Arc<Shared>,
    accept_task: JoinHandle<()>,
}

impl PjlinkSimulator {
    /// Binds a listener and starts accepting connections.
    ///
    /// Bind to port 0 for an ephemeral test port.
    ///
    /// # Errors
    ///
    /// Propagates the bind failure.
    pub async fn bind(addr: impl ToSocketAddrs, config: SimulatorConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(SimState::default()),
        });

        let accept_shared = Arc::clone(&shared);
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        tracing::debug!(peer = %peer, "simulator connection");
                        let shared = Arc::clone(&accept_shared);
                        tokio::spawn(async move {
                            if let Err(err) = handle_client(stream, shared).await {
                                tracing::debug!(error = %err, "simulator handler error");
                            }
                        });
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "simulator accept failed");
                    }
                }
            }
        });

        tracing::info!(addr = %local_addr, "PJLink simulator listening");
        Ok(Self {
            local_addr,
            shared,
            accept_task,
        })
    }

    /// The address the simulator is listening on.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current POWR code, for test assertions.
    #[must_use]
    pub fn power_code(&self) -> &'static str {
        self.shared.state.lock().power.as_str()
    }

    /// Stops accepting connections.
    pub fn shutdown(&self) {
        self.accept_task.abort();
    }
}

impl Drop for PjlinkSimulator {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn handle_client(stream: TcpStream, shared: Arc<Shared>) -> io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let token = if shared.config.password.is_some() {
        format!("{:08x}", rand::rng().random::<u32>())
    } else {
        String::new()
    };
    let greeting = if token.is_empty() {
        "PJLINK 0\r".to_string()
    } else {
        format!("PJLINK 1 {token}\r")
    };
    write_half.write_all(greeting.as_bytes()).await?;
    write_half.flush().await?;

    let mut line = String::new();
    match timeout(CLIENT_TIMEOUT, reader.read_line(&mut line)).await {
        Ok(read) => {
            if read? == 0 {
                return Ok(());
            }
        }
        Err(_) => return Ok(()),
    }
    let mut line = line.trim().to_string();
    if line.is_empty() {
        return Ok(());
    }

    if let Some(password) = &shared.config.password
        && line.len() >= 32
    {
        let expected = pjlink_auth_digest(&token, password);
        let (given, rest) = line.split_at(32);
        if given != expected {
            write_half.write_all(b"PJLINK ERRA\r").await?;
            return Ok(());
        }
        line = rest.to_string();
    }

    let response = process_command(&shared, &line);
    tracing::debug!(command = %line, response = %response, "simulator exchange");
    write_half.write_all(format!("{response}\r").as_bytes()).await?;
    write_half.flush().await?;
    Ok(())
}

fn process_command(shared: &Arc<Shared>, line: &str) -> String {
    let Some(rest) = line.strip_prefix("%1") else {
        return "%1ERR2".to_string();
    };
    let Some((cmd, param)) = rest.split_once(' ') else {
        return "%1ERR2".to_string();
    };
    let param = param.trim();

    match cmd.to_ascii_uppercase().as_str() {
        "POWR" => handle_power(shared, param),
        "INPT" => handle_input(shared, param),
        "AVMT" => handle_avmt(shared, param),
        "NAME" => {
            if param == "?" {
                format!("%1NAME={}", shared.config.name)
            } else {
                "%1NAME=ERR2".to_string()
            }
        }
        "INF1" => {
            if param == "?" {
                "%1INF1=Nomy".to_string()
            } else {
                "%1INF1=ERR2".to_string()
            }
        }
        "INF2" => {
            if param == "?" {
                "%1INF2=VirtualDisplay".to_string()
            } else {
                "%1INF2=ERR2".to_string()
            }
        }
        "LAMP" => {
            if param == "?" {
                format!("%1LAMP={} 1", shared.state.lock().lamp_hours)
            } else {
                "%1LAMP=ERR2".to_string()
            }
        }
        _ => "%1ERR3".to_string(),
    }
}

fn handle_power(shared: &Arc<Shared>, param: &str) -> String {
    match param {
        "?" => format!("%1POWR={}", shared.state.lock().power.as_str()),
        "1" => {
            {
                let mut state = shared.state.lock();
                if state.power == PowerCode::On {
                    return "%1POWR=OK".to_string();
                }
                state.power = PowerCode::Warming;
            }
            spawn_transition(shared, shared.config.warm_up, PowerCode::Warming, PowerCode::On);
            "%1POWR=OK".to_string()
        }
        "0" => {
            {
                let mut state = shared.state.lock();
                if state.power == PowerCode::Off {
                    return "%1POWR=OK".to_string();
                }
                state.power = PowerCode::Cooling;
            }
            spawn_transition(shared, shared.config.cool_down, PowerCode::Cooling, PowerCode::Off);
            "%1POWR=OK".to_string()
        }
        _ => "%1POWR=ERR2".to_string(),
    }
}

/// After `delay`, completes a transition unless something else moved the
/// power state in the meantime.
fn spawn_transition(shared: &Arc<Shared>, delay: Duration, from: PowerCode, to: PowerCode) {
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let mut state = shared.state.lock();
        if state.power == from {
            state.power = to;
            if to == PowerCode::On {
                state.lamp_hours += 1;
            }
        }
    });
}

fn handle_input(shared: &Arc<Shared>, param: &str) -> String {
    let mut state = shared.state.lock();
    if param == "?" {
        format!("%1INPT={}", state.input)
    } else if state.power != PowerCode::On {
        // No input switching until fully powered on.
        "%1INPT=ERR3".to_string()
    } else {
        state.input = param.to_string();
        "%1INPT=OK".to_string()
    }
}

fn handle_avmt(shared: &Arc<Shared>, param: &str) -> String {
    let mut state = shared.state.lock();
    if param == "?" {
        format!("%1AVMT={}", state.avmt)
    } else if matches!(param, "10" | "11" | "20" | "21" | "30" | "31") {
        state.avmt = param.to_string();
        "%1AVMT=OK".to_string()
    } else {
        "%1AVMT=ERR2".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(password: Option<&str>) -> Arc<Shared> {
        Arc::new(Shared {
            config: SimulatorConfig {
                password: password.map(str::to_string),
                warm_up: Duration::from_millis(10),
                cool_down: Duration::from_millis(10),
                ..SimulatorConfig::default()
            },
            state: Mutex::new(SimState::default()),
        })
    }

    #[tokio::test]
    async fn power_query_starts_off() {
        let sim = shared(None);
        assert_eq!(process_command(&sim, "%1POWR ?"), "%1POWR=0");
    }

    #[tokio::test]
    async fn power_on_goes_through_warming() {
        let sim = shared(None);
        assert_eq!(process_command(&sim, "%1POWR 1"), "%1POWR=OK");
        assert_eq!(process_command(&sim, "%1POWR ?"), "%1POWR=2");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(process_command(&sim, "%1POWR ?"), "%1POWR=1");
    }

    #[tokio::test]
    async fn input_rejected_until_fully_on() {
        let sim = shared(None);
        assert_eq!(process_command(&sim, "%1INPT 32"), "%1INPT=ERR3");

        process_command(&sim, "%1POWR 1");
        assert_eq!(process_command(&sim, "%1INPT 32"), "%1INPT=ERR3");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(process_command(&sim, "%1INPT 32"), "%1INPT=OK");
        assert_eq!(process_command(&sim, "%1INPT ?"), "%1INPT=32");
    }

    #[tokio::test]
    async fn malformed_lines_are_err2() {
        let sim = shared(None);
        assert_eq!(process_command(&sim, "POWR 1"), "%1ERR2");
        assert_eq!(process_command(&sim, "%1POWR"), "%1ERR2");
    }

    #[tokio::test]
    async fn unsupported_command_is_err3() {
        let sim = shared(None);
        assert_eq!(process_command(&sim, "%1FREZ 1"), "%1ERR3");
    }

    #[tokio::test]
    async fn avmt_validates_parameters() {
        let sim = shared(None);
        assert_eq!(process_command(&sim, "%1AVMT ?"), "%1AVMT=30");
        assert_eq!(process_command(&sim, "%1AVMT 31"), "%1AVMT=OK");
        assert_eq!(process_command(&sim, "%1AVMT 99"), "%1AVMT=ERR2");
    }
}
