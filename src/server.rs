//! TCP command interface
//!
//! Newline-delimited JSON requests, one response line per request. Identity
//! is the peer address: movement and mode commands are accepted only from
//! the configured control hosts, resolved once per connection. Human side
//! names ("east", "both") are translated here through `config.sides`; the
//! supervisor core only ever sees ordered a/b strings.

use crate::config::Config;
use crate::dome::DomeSupervisor;
use crate::error::Result;
use crate::types::CommandOutcome;
use serde::Deserialize;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
enum Request {
    Status,
    OpenShutters {
        sides: String,
        #[serde(default)]
        steps: u32,
    },
    CloseShutters {
        sides: String,
        #[serde(default)]
        steps: u32,
    },
    Stop,
    SetEngineeringMode {
        enabled: bool,
    },
    SetHeartbeatTimer {
        timeout: i64,
    },
    SetHeartbeatSiren {
        enabled: bool,
    },
}

/// Command server over the dome supervisor
pub struct CommandServer {
    supervisor: Arc<DomeSupervisor>,
    config: Config,
}

impl CommandServer {
    pub fn new(supervisor: Arc<DomeSupervisor>, config: Config) -> Self {
        CommandServer { supervisor, config }
    }

    /// Accept connections until `running` clears. Each client gets its own
    /// handler thread; a movement command parks that thread for the whole
    /// travel, which is the intended single-mover behavior.
    pub fn run(&self, running: Arc<AtomicBool>) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_address)?;
        listener.set_nonblocking(true)?;
        log::info!("Command interface listening on {}", self.config.bind_address);

        while running.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    log::info!("Client connected: {}", addr);
                    let supervisor = Arc::clone(&self.supervisor);
                    let config = self.config.clone();
                    thread::Builder::new()
                        .name("command-handler".to_string())
                        .spawn(move || {
                            if let Err(e) = handle_client(stream, addr, &supervisor, &config) {
                                log::debug!("Client {} disconnected: {}", addr, e);
                            }
                        })?;
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(100));
                }
                Err(e) => log::error!("Accept error: {}", e),
            }
        }

        Ok(())
    }
}

fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    supervisor: &DomeSupervisor,
    config: &Config,
) -> Result<()> {
    let authorized = config.is_control_ip(addr.ip());
    let reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => dispatch(request, authorized, supervisor, config),
            Err(e) => json!({ "error": format!("invalid request: {}", e) }),
        };
        writeln!(writer, "{}", response)?;
    }

    Ok(())
}

fn dispatch(
    request: Request,
    authorized: bool,
    supervisor: &DomeSupervisor,
    config: &Config,
) -> serde_json::Value {
    match request {
        Request::Status => match supervisor.status() {
            Ok(snapshot) => json!({ "status": snapshot }),
            Err(e) => json!({ "error": e.to_string() }),
        },
        Request::OpenShutters { sides, steps } => {
            let order = resolve_sides(config, &sides);
            outcome_json(supervisor.open_shutters(authorized, &order, steps))
        }
        Request::CloseShutters { sides, steps } => {
            let mut order = resolve_sides(config, &sides);
            if config.invert_on_close {
                order = order.chars().rev().collect();
            }
            outcome_json(supervisor.close_shutters(authorized, &order, steps))
        }
        Request::Stop => outcome_json(supervisor.stop(authorized)),
        Request::SetEngineeringMode { enabled } => {
            outcome_json(supervisor.set_engineering_mode(authorized, enabled))
        }
        Request::SetHeartbeatTimer { timeout } => {
            outcome_json(supervisor.set_heartbeat_timer(authorized, timeout))
        }
        Request::SetHeartbeatSiren { enabled } => {
            outcome_json(supervisor.set_heartbeat_siren(authorized, enabled))
        }
    }
}

/// Translate a human side name through the configured mapping; strings that
/// are already a/b orderings pass through untouched.
fn resolve_sides(config: &Config, requested: &str) -> String {
    config
        .sides
        .get(requested)
        .cloned()
        .unwrap_or_else(|| requested.to_string())
}

fn outcome_json(outcome: CommandOutcome) -> serde_json::Value {
    json!({ "outcome": outcome, "message": outcome.message() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parsing() {
        let request: Request =
            serde_json::from_str(r#"{"method": "open_shutters", "sides": "ab"}"#).unwrap();
        assert!(matches!(
            request,
            Request::OpenShutters { ref sides, steps: 0 } if sides == "ab"
        ));

        let request: Request =
            serde_json::from_str(r#"{"method": "set_heartbeat_timer", "timeout": 90}"#).unwrap();
        assert!(matches!(request, Request::SetHeartbeatTimer { timeout: 90 }));

        assert!(serde_json::from_str::<Request>(r#"{"method": "reboot"}"#).is_err());
    }

    #[test]
    fn test_outcome_json_shape() {
        let value = outcome_json(CommandOutcome::Blocked);
        assert_eq!(value["outcome"], 2);
        assert_eq!(value["message"], "error: another command is already running");
    }
}
