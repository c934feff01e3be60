//! Dome supervisor: owns the serial links, the shared state and the two
//! monitor threads, and exposes the command surface called by the RPC layer.
//!
//! # Concurrency contract
//!
//! - `state` (the status mutex) guards the shutter pair, the timestamps and
//!   the heartbeat/engineering/siren fields. Writers hold it briefly;
//!   `status()` holds it for snapshot assembly.
//! - `command_lock` guards the right to move the dome or toggle engineering
//!   mode. Commands try it non-blockingly; only `stop()` blocks on it, after
//!   raising `force_stopped`, which is exactly what guarantees the in-flight
//!   movement has drained by the time `stop()` returns.
//! - Lock order is always command_lock before state, never the reverse. The
//!   monitor threads never touch command_lock.

mod link;
mod monitor;
mod movement;
pub mod protocol;
pub mod state;

use crate::belt::{BeltSensors, DomeAlertClient};
use crate::config::Config;
use crate::error::Result;
use crate::events::{DaemonLog, EventSink};
use crate::transport::{Connect, SerialConnector};
use crate::types::{
    CommandOutcome, HeartbeatState, ShutterStatus, Side, StatusSnapshot,
};
use link::DomeLink;
use parking_lot::Mutex;
use state::DomeState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// State and collaborators shared by the supervisor, the monitor threads and
/// the movement driver.
pub(crate) struct Shared {
    pub config: Config,
    pub state: Mutex<DomeState>,
    pub command_lock: Mutex<()>,
    pub force_stopped: AtomicBool,
    pub shutdown: Arc<AtomicBool>,
    pub shutter_link: DomeLink,
    pub heartbeat_link: DomeLink,
    pub belt: Option<Box<dyn BeltSensors>>,
    pub events: Box<dyn EventSink>,
}

impl Shared {
    pub fn log_info(&self, message: &str) {
        self.events.info(&self.config.log_name, message);
    }

    pub fn log_warn(&self, message: &str) {
        self.events.warn(&self.config.log_name, message);
    }

    pub fn log_error(&self, message: &str) {
        self.events.error(&self.config.log_name, message);
    }

    /// Whether the side's belt sensor currently reports slack. Unbound
    /// sensors and read failures report tensioned: a flaky sensor daemon
    /// must not strand the dome half-open.
    pub fn belt_slack(&self, side: Side) -> bool {
        let Some(belt) = &self.belt else {
            return false;
        };
        match belt.belt_tensioned(side) {
            Ok(Some(tensioned)) => !tensioned,
            Ok(None) => false,
            Err(e) => {
                log::warn!("Belt sensor read failed: {}", e);
                false
            }
        }
    }
}

/// The dome supervisor
pub struct DomeSupervisor {
    shared: Arc<Shared>,
    monitors: Mutex<Vec<JoinHandle<()>>>,
}

impl DomeSupervisor {
    /// Create a supervisor over explicit link factories and collaborators.
    /// Tests pass mock connectors and a capturing event sink here.
    pub fn new(
        config: Config,
        shutter: Box<dyn Connect>,
        heartbeat: Box<dyn Connect>,
        belt: Option<Box<dyn BeltSensors>>,
        events: Box<dyn EventSink>,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutter_link = DomeLink::new(
            "dome controller",
            shutter,
            config.serial_timeout(),
            Arc::clone(&shutdown),
        );
        let heartbeat_link = DomeLink::new(
            "heartbeat monitor",
            heartbeat,
            config.heartbeat_timeout(),
            Arc::clone(&shutdown),
        );

        DomeSupervisor {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(DomeState::default()),
                command_lock: Mutex::new(()),
                force_stopped: AtomicBool::new(false),
                shutdown,
                shutter_link,
                heartbeat_link,
                belt,
                events,
            }),
            monitors: Mutex::new(Vec::new()),
        }
    }

    /// Build a supervisor over the real serial devices and the default
    /// collaborators named in the configuration.
    pub fn from_config(config: &Config) -> Self {
        let shutter = Box::new(SerialConnector::new(&config.serial_port, config.serial_baud));
        let heartbeat = Box::new(SerialConnector::new(
            &config.heartbeat_port,
            config.heartbeat_baud,
        ));
        let belt = config.domealert_address.as_ref().map(|address| {
            Box::new(DomeAlertClient::new(
                address,
                config.domealert_belt_sensors.clone(),
            )) as Box<dyn BeltSensors>
        });

        Self::new(config.clone(), shutter, heartbeat, belt, Box::new(DaemonLog))
    }

    /// Spawn the two monitor threads
    pub fn start(&self) -> Result<()> {
        let mut monitors = self.monitors.lock();
        monitors.push(monitor::spawn_shutter_monitor(Arc::clone(&self.shared))?);
        monitors.push(monitor::spawn_heartbeat_monitor(Arc::clone(&self.shared))?);
        Ok(())
    }

    /// Signal the monitor threads and wait for them to exit
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        for handle in self.monitors.lock().drain(..) {
            let _ = handle.join();
        }
    }

    /// Open one or both shutters, in the requested order.
    ///
    /// `sides` is a one- or two-character string over {a,b}; `steps > 0`
    /// bounds the movement to that many step commands instead of driving to
    /// the open limit.
    pub fn open_shutters(&self, authorized: bool, sides: &str, steps: u32) -> CommandOutcome {
        let s = &*self.shared;
        if !authorized {
            return CommandOutcome::InvalidControlIP;
        }

        {
            let state = s.state.lock();
            if state.engineering_mode {
                return CommandOutcome::EngineeringModeActive;
            }
            match state.heartbeat {
                HeartbeatState::TrippedClosing => return CommandOutcome::HeartbeatCloseInProgress,
                HeartbeatState::TrippedIdle => return CommandOutcome::HeartbeatTimedOut,
                _ => {}
            }
        }

        let Some(order) = parse_sides(sides) else {
            log::error!("Invalid sides argument: {:?}", sides);
            return CommandOutcome::Failed;
        };

        let Some(_guard) = s.command_lock.try_lock() else {
            return CommandOutcome::Blocked;
        };

        s.log_info(&describe_movement("Opening", &order, &s.config));

        let mut siren = true;
        let mut success = true;
        for &side in &order {
            if s.state.lock().shutter(side) == ShutterStatus::Open {
                continue;
            }
            success &= s.open_side(side, steps, &mut siren);
        }

        if success {
            s.log_info("Open complete");
            CommandOutcome::Succeeded
        } else {
            s.log_error("Failed to open dome");
            CommandOutcome::Failed
        }
    }

    /// Close one or both shutters, in the requested order.
    pub fn close_shutters(&self, authorized: bool, sides: &str, steps: u32) -> CommandOutcome {
        let s = &*self.shared;
        if !authorized {
            return CommandOutcome::InvalidControlIP;
        }

        {
            let state = s.state.lock();
            if state.engineering_mode {
                return CommandOutcome::EngineeringModeActive;
            }
            match state.heartbeat {
                HeartbeatState::TrippedClosing => return CommandOutcome::HeartbeatCloseInProgress,
                HeartbeatState::TrippedIdle => return CommandOutcome::HeartbeatTimedOut,
                _ => {}
            }
        }

        let Some(order) = parse_sides(sides) else {
            log::error!("Invalid sides argument: {:?}", sides);
            return CommandOutcome::Failed;
        };

        let Some(_guard) = s.command_lock.try_lock() else {
            return CommandOutcome::Blocked;
        };

        s.log_info(&describe_movement("Closing", &order, &s.config));

        let mut siren = true;
        let mut success = true;
        for &side in &order {
            if s.state.lock().shutter(side) == ShutterStatus::Closed {
                continue;
            }
            success &= s.close_side(side, steps, &mut siren);
        }

        if success {
            s.log_info("Close complete");
            CommandOutcome::Succeeded
        } else {
            s.log_error("Failed to close dome");
            CommandOutcome::Failed
        }
    }

    /// Interrupt any in-flight movement. Returns once the movement has
    /// observed the stop and released the command mutex.
    pub fn stop(&self, authorized: bool) -> CommandOutcome {
        let s = &*self.shared;
        if !authorized {
            return CommandOutcome::InvalidControlIP;
        }
        if s.state.lock().heartbeat == HeartbeatState::TrippedClosing {
            return CommandOutcome::HeartbeatCloseInProgress;
        }

        s.force_stopped.store(true, Ordering::Relaxed);
        // Reclaiming the mutex proves the mover saw the flag and returned
        drop(s.command_lock.lock());
        s.force_stopped.store(false, Ordering::Relaxed);

        s.log_info("Movement stopped");
        CommandOutcome::Succeeded
    }

    /// Toggle the engineering-mode interlock. Refused while the heartbeat
    /// is live: servicing must not silence a counting watchdog.
    pub fn set_engineering_mode(&self, authorized: bool, enabled: bool) -> CommandOutcome {
        let s = &*self.shared;
        if !authorized {
            return CommandOutcome::InvalidControlIP;
        }

        let Some(_guard) = s.command_lock.try_lock() else {
            return CommandOutcome::Blocked;
        };

        let mut state = s.state.lock();
        match state.heartbeat {
            HeartbeatState::TrippedClosing => CommandOutcome::HeartbeatCloseInProgress,
            HeartbeatState::Active { .. } => {
                CommandOutcome::EngineeringModeRequiresHeartbeatDisabled
            }
            _ => {
                if state.engineering_mode != enabled {
                    state.engineering_mode = enabled;
                    drop(state);
                    s.log_info(if enabled {
                        "Engineering mode enabled"
                    } else {
                        "Engineering mode disabled"
                    });
                }
                CommandOutcome::Succeeded
            }
        }
    }

    /// Arm (or with zero, disarm) the hardware watchdog countdown.
    pub fn set_heartbeat_timer(&self, authorized: bool, timeout_seconds: i64) -> CommandOutcome {
        let s = &*self.shared;
        if !authorized {
            return CommandOutcome::InvalidControlIP;
        }

        {
            let state = s.state.lock();
            if state.engineering_mode {
                return CommandOutcome::EngineeringModeActive;
            }
            match state.heartbeat {
                HeartbeatState::Unavailable => return CommandOutcome::HeartbeatUnavailable,
                HeartbeatState::TrippedClosing => {
                    return CommandOutcome::HeartbeatCloseInProgress
                }
                // A zero timeout may disarm from the tripped state
                HeartbeatState::TrippedIdle if timeout_seconds != 0 => {
                    return CommandOutcome::HeartbeatTimedOut
                }
                _ => {}
            }
        }

        let Some(ticks) = protocol::arming_byte(timeout_seconds) else {
            return CommandOutcome::HeartbeatInvalidTimeout;
        };

        match s.heartbeat_link.write_byte(ticks) {
            Ok(()) => CommandOutcome::Succeeded,
            Err(e) => {
                log::error!("Failed to write heartbeat countdown: {}", e);
                CommandOutcome::Failed
            }
        }
    }

    /// Toggle the pre-movement warning siren. The emergency-close siren is
    /// the monitor hardware's own and is not affected.
    pub fn set_heartbeat_siren(&self, authorized: bool, enabled: bool) -> CommandOutcome {
        let s = &*self.shared;
        if !authorized {
            return CommandOutcome::InvalidControlIP;
        }

        let mut state = s.state.lock();
        if state.siren_enabled != enabled {
            state.siren_enabled = enabled;
            drop(state);
            s.log_info(if enabled {
                "Movement warning siren enabled"
            } else {
                "Movement warning siren disabled"
            });
        }
        CommandOutcome::Succeeded
    }

    /// Assemble a point-in-time status snapshot. Belt sensor failures
    /// propagate to the caller.
    pub fn status(&self) -> Result<StatusSnapshot> {
        let s = &*self.shared;

        // External sensor query happens before the status mutex is taken
        let (belt_a, belt_b) = match &s.belt {
            Some(belt) => (belt.belt_tensioned(Side::A)?, belt.belt_tensioned(Side::B)?),
            None => (None, None),
        };

        let state = s.state.lock();
        Ok(StatusSnapshot {
            timestamp_us: state.status_timestamp_us,
            shutter_a: state.shutter_a,
            shutter_a_label: state.shutter_a.label(),
            shutter_b: state.shutter_b,
            shutter_b_label: state.shutter_b.label(),
            closed: state.shutter_a == ShutterStatus::Closed
                && state.shutter_b == ShutterStatus::Closed,
            engineering_mode: state.engineering_mode,
            heartbeat_timestamp_us: state.heartbeat_timestamp_us,
            heartbeat: state.heartbeat,
            heartbeat_label: state.heartbeat.label(),
            heartbeat_remaining: state.heartbeat.remaining(),
            siren_enabled: state.siren_enabled,
            belt_a_tensioned: belt_a,
            belt_b_tensioned: belt_b,
        })
    }
}

impl Drop for DomeSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn parse_sides(sides: &str) -> Option<Vec<Side>> {
    if sides.is_empty() || sides.len() > 2 {
        return None;
    }
    let mut order = Vec::with_capacity(2);
    for c in sides.chars() {
        order.push(Side::from_char(c)?);
    }
    if order.len() == 2 && order[0] == order[1] {
        return None;
    }
    Some(order)
}

fn describe_movement(verb: &str, order: &[Side], config: &Config) -> String {
    if order.len() == 2 {
        format!("{} both shutters", verb)
    } else {
        format!("{} {} shutter", verb, config.side_labels.get(order[0]))
    }
}
