//! Configuration loading from JSON
//!
//! The configuration document is read once at startup and is immutable for
//! the life of the process. Example:
//!
//! ```json
//! {
//!     "log_name": "dome",
//!     "bind_address": "0.0.0.0:9003",
//!     "control_ips": ["10.2.6.202"],
//!     "serial_port": "/dev/dome-controller",
//!     "serial_baud": 9600,
//!     "serial_timeout": 5.0,
//!     "shutter_timeout": 60.0,
//!     "has_legacy_controller": false,
//!     "has_bumper_guard": false,
//!     "slow_open_steps": 0,
//!     "heartbeat_port": "/dev/dome-monitor",
//!     "heartbeat_baud": 9600,
//!     "heartbeat_timeout": 3.0,
//!     "sides": {"east": "a", "west": "b", "both": "ab"},
//!     "side_labels": {"a": "east", "b": "west"},
//!     "invert_on_close": false
//! }
//! ```
//!
//! `command_delay` (0.5 s) and `step_command_delay` (2.0 s) may be omitted.
//! The optional `domealert_address` / `domealert_belt_sensors` fields bind
//! the belt-tension oracle; absent means no belt checking.

use crate::error::{Error, Result};
use crate::types::Side;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

fn default_command_delay() -> f64 {
    0.5
}

fn default_step_command_delay() -> f64 {
    2.0
}

/// Display names for the two shutters (e.g. "east"/"west")
#[derive(Debug, Clone, Deserialize)]
pub struct SideLabels {
    pub a: String,
    pub b: String,
}

impl SideLabels {
    pub fn get(&self, side: Side) -> &str {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }
}

/// Belt-tension sensor names on the sensor daemon, per side
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BeltSensorNames {
    #[serde(default)]
    pub a: Option<String>,
    #[serde(default)]
    pub b: Option<String>,
}

impl BeltSensorNames {
    pub fn get(&self, side: Side) -> Option<&str> {
        match side {
            Side::A => self.a.as_deref(),
            Side::B => self.b.as_deref(),
        }
    }
}

/// Daemon configuration parsed from a JSON file
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Event-source tag used for observatory log entries
    pub log_name: String,

    /// TCP listen address for the command interface
    pub bind_address: String,

    /// Hosts allowed to issue movement and mode commands
    pub control_ips: Vec<IpAddr>,

    /// Serial device of the shutter controller
    pub serial_port: String,
    pub serial_baud: u32,
    /// Controller read timeout (seconds)
    pub serial_timeout: f64,

    /// Delay between full-speed step commands (seconds)
    #[serde(default = "default_command_delay")]
    pub command_delay: f64,

    /// Delay between slow-ramp / bounded step commands (seconds)
    #[serde(default = "default_step_command_delay")]
    pub step_command_delay: f64,

    /// Budget for a full shutter travel (seconds)
    pub shutter_timeout: f64,

    /// Legacy controllers only emit status bytes on transitions and report
    /// movement as PARTIALLY OPEN
    pub has_legacy_controller: bool,

    /// Controller has a bumper-guard relay that must be reset before moving
    pub has_bumper_guard: bool,

    /// Steps of the slow-open belt-slack ramp; 0 disables the ramp
    pub slow_open_steps: u32,

    /// Serial device of the heartbeat monitor
    pub heartbeat_port: String,
    pub heartbeat_baud: u32,
    /// Heartbeat monitor read timeout (seconds)
    pub heartbeat_timeout: f64,

    /// Human side names accepted by the command interface, mapped to ordered
    /// movement strings over {a,b} (e.g. "east" -> "a", "both" -> "ab")
    pub sides: HashMap<String, String>,
    pub side_labels: SideLabels,

    /// Close in the reverse of the requested side order
    pub invert_on_close: bool,

    /// Address of the external belt-tension sensor daemon
    #[serde(default)]
    pub domealert_address: Option<String>,
    #[serde(default)]
    pub domealert_belt_sensors: BeltSensorNames,
}

impl Config {
    /// Load and validate configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.bind_address.parse::<SocketAddr>().is_err() {
            return Err(Error::Config(format!(
                "bind_address is not a valid socket address: {}",
                self.bind_address
            )));
        }

        if self.serial_baud == 0 || self.heartbeat_baud == 0 {
            return Err(Error::Config("baud rates must be non-zero".to_string()));
        }

        if self.serial_timeout <= 0.0 || self.heartbeat_timeout <= 0.0 {
            return Err(Error::Config("read timeouts must be positive".to_string()));
        }

        if self.shutter_timeout <= 0.0 {
            return Err(Error::Config("shutter_timeout must be positive".to_string()));
        }

        for (name, order) in &self.sides {
            if order.is_empty() || order.len() > 2 {
                return Err(Error::Config(format!(
                    "side mapping '{}' must name one or two shutters, got '{}'",
                    name, order
                )));
            }
            if order.chars().any(|c| !matches!(c, 'a' | 'b')) {
                return Err(Error::Config(format!(
                    "side mapping '{}' contains shutters other than a/b: '{}'",
                    name, order
                )));
            }
            if order.len() == 2 && order.as_bytes()[0] == order.as_bytes()[1] {
                return Err(Error::Config(format!(
                    "side mapping '{}' repeats a shutter: '{}'",
                    name, order
                )));
            }
        }

        let has_belt_sensors = self.domealert_belt_sensors.a.is_some()
            || self.domealert_belt_sensors.b.is_some();
        if has_belt_sensors && self.domealert_address.is_none() {
            return Err(Error::Config(
                "domealert_belt_sensors requires domealert_address".to_string(),
            ));
        }

        Ok(())
    }

    pub fn command_delay(&self) -> Duration {
        Duration::from_secs_f64(self.command_delay)
    }

    pub fn step_command_delay(&self) -> Duration {
        Duration::from_secs_f64(self.step_command_delay)
    }

    pub fn shutter_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.shutter_timeout)
    }

    pub fn serial_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.serial_timeout)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.heartbeat_timeout)
    }

    /// Whether the caller's address is on the control allowlist
    pub fn is_control_ip(&self, addr: IpAddr) -> bool {
        self.control_ips.contains(&addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> serde_json::Value {
        serde_json::json!({
            "log_name": "dome",
            "bind_address": "127.0.0.1:9003",
            "control_ips": ["10.2.6.202"],
            "serial_port": "/dev/dome-controller",
            "serial_baud": 9600,
            "serial_timeout": 5.0,
            "shutter_timeout": 60.0,
            "has_legacy_controller": false,
            "has_bumper_guard": false,
            "slow_open_steps": 0,
            "heartbeat_port": "/dev/dome-monitor",
            "heartbeat_baud": 9600,
            "heartbeat_timeout": 3.0,
            "sides": {"east": "a", "west": "b", "both": "ab"},
            "side_labels": {"a": "east", "b": "west"},
            "invert_on_close": false
        })
    }

    fn parse(value: serde_json::Value) -> Result<Config> {
        let config: Config = serde_json::from_value(value)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_parse_sample() {
        let config = parse(sample_json()).unwrap();
        assert_eq!(config.serial_baud, 9600);
        assert_eq!(config.sides["both"], "ab");
        assert_eq!(config.side_labels.get(Side::A), "east");
        assert!(config.is_control_ip("10.2.6.202".parse().unwrap()));
        assert!(!config.is_control_ip("10.2.6.1".parse().unwrap()));
    }

    #[test]
    fn test_delay_defaults() {
        let config = parse(sample_json()).unwrap();
        assert_eq!(config.command_delay, 0.5);
        assert_eq!(config.step_command_delay, 2.0);
    }

    #[test]
    fn test_rejects_bad_side_mapping() {
        let mut value = sample_json();
        value["sides"]["roof"] = serde_json::json!("ac");
        assert!(parse(value).is_err());

        let mut value = sample_json();
        value["sides"]["both"] = serde_json::json!("aa");
        assert!(parse(value).is_err());
    }

    #[test]
    fn test_rejects_belt_sensors_without_daemon() {
        let mut value = sample_json();
        value["domealert_belt_sensors"] = serde_json::json!({"a": "east_belt"});
        assert!(parse(value).is_err());
    }

    #[test]
    fn test_rejects_zero_baud() {
        let mut value = sample_json();
        value["serial_baud"] = serde_json::json!(0);
        assert!(parse(value).is_err());
    }
}
