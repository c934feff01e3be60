//! Monitor loops for the two serial links
//!
//! Each monitor owns its link: it reconnects on any I/O error after a fixed
//! delay, decodes the byte stream and publishes into the shared state under
//! the status mutex. Error episodes are logged exactly once; recovery is
//! logged as "Restored".

use super::protocol::{self, StatusByte};
use super::Shared;
use crate::error::{Error, Result};
use crate::types::{HeartbeatState, ShutterStatus, Side};
use std::mem::discriminant;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Wait between reconnection attempts after an I/O error
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Slice length used when sleeping so shutdown stays responsive
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

pub(crate) fn spawn_shutter_monitor(shared: Arc<Shared>) -> Result<JoinHandle<()>> {
    Ok(thread::Builder::new()
        .name("shutter-monitor".to_string())
        .spawn(move || shutter_monitor(&shared))?)
}

pub(crate) fn spawn_heartbeat_monitor(shared: Arc<Shared>) -> Result<JoinHandle<()>> {
    Ok(thread::Builder::new()
        .name("heartbeat-monitor".to_string())
        .spawn(move || heartbeat_monitor(&shared))?)
}

fn sleep_unless_shutdown(shared: &Shared, duration: Duration) {
    let mut remaining = duration;
    while !remaining.is_zero() && !shared.shutdown.load(Ordering::Relaxed) {
        let slice = remaining.min(SHUTDOWN_POLL);
        thread::sleep(slice);
        remaining -= slice;
    }
}

fn shutter_monitor(shared: &Shared) {
    log::info!("Shutter monitor started");
    let mut in_error = false;

    while !shared.shutdown.load(Ordering::Relaxed) {
        if !shared.shutter_link.is_connected() {
            match shared.shutter_link.connect() {
                Ok(first) => {
                    in_error = false;
                    shared.log_info(if first {
                        "Established contact with dome controller"
                    } else {
                        "Restored contact with dome controller"
                    });
                }
                Err(e) => {
                    if !in_error {
                        in_error = true;
                        shared.log_error(&format!("Unable to contact dome controller: {}", e));
                    }
                    sleep_unless_shutdown(shared, RECONNECT_DELAY);
                    continue;
                }
            }
        }

        match shared.shutter_link.read_byte() {
            Ok(Some(byte)) => handle_status_byte(shared, byte),
            Ok(None) => {
                // Legacy controllers are silent when nothing is moving;
                // modern ones report continuously, so silence means the
                // link is dead.
                if !shared.config.has_legacy_controller
                    && !shared.shutdown.load(Ordering::Relaxed)
                {
                    drop_shutter_link(shared, &mut in_error, Error::ReadTimeout);
                }
            }
            Err(e) => drop_shutter_link(shared, &mut in_error, e),
        }
    }

    log::info!("Shutter monitor stopped");
}

fn drop_shutter_link(shared: &Shared, in_error: &mut bool, error: Error) {
    if !*in_error {
        *in_error = true;
        shared.log_error(&format!("Lost contact with dome controller: {}", error));
    }
    shared.shutter_link.disconnect();
    sleep_unless_shutdown(shared, RECONNECT_DELAY);
}

fn handle_status_byte(shared: &Shared, byte: u8) {
    let result = {
        let mut state = shared.state.lock();
        let mut a = state.shutter_a;
        let mut b = state.shutter_b;
        let result =
            protocol::apply_status_byte(byte, shared.config.has_legacy_controller, &mut a, &mut b);
        if result == StatusByte::Updated {
            state.shutter_a = a;
            state.shutter_b = b;
            state.touch_status();
        }
        result
    };

    match result {
        StatusByte::Updated => {
            log::debug!("Controller status byte '{}'", byte.escape_ascii())
        }
        StatusByte::BumperReset => shared.log_info("Bumper guard relay reset"),
        StatusByte::Unknown => {
            shared.log_warn(&format!("Unknown dome status code: 0x{:02X}", byte))
        }
    }
}

fn heartbeat_monitor(shared: &Shared) {
    log::info!("Heartbeat monitor started");
    let mut in_error = false;

    while !shared.shutdown.load(Ordering::Relaxed) {
        if !shared.heartbeat_link.is_connected() {
            match shared.heartbeat_link.connect() {
                Ok(first) => {
                    in_error = false;
                    shared.log_info(if first {
                        "Established contact with heartbeat monitor"
                    } else {
                        "Restored contact with heartbeat monitor"
                    });
                }
                Err(e) => {
                    mark_heartbeat_unavailable(shared);
                    if !in_error {
                        in_error = true;
                        shared.log_error(&format!("Unable to contact heartbeat monitor: {}", e));
                    }
                    sleep_unless_shutdown(shared, RECONNECT_DELAY);
                    continue;
                }
            }
        }

        match shared.heartbeat_link.read_byte() {
            Ok(Some(byte)) => handle_heartbeat_sample(shared, byte),
            Ok(None) => {
                if !shared.shutdown.load(Ordering::Relaxed) {
                    drop_heartbeat_link(shared, &mut in_error, Error::ReadTimeout);
                }
            }
            Err(e) => drop_heartbeat_link(shared, &mut in_error, e),
        }
    }

    log::info!("Heartbeat monitor stopped");
}

fn drop_heartbeat_link(shared: &Shared, in_error: &mut bool, error: Error) {
    mark_heartbeat_unavailable(shared);
    if !*in_error {
        *in_error = true;
        shared.log_error(&format!("Lost contact with heartbeat monitor: {}", error));
    }
    shared.heartbeat_link.disconnect();
    sleep_unless_shutdown(shared, RECONNECT_DELAY);
}

fn mark_heartbeat_unavailable(shared: &Shared) {
    let mut state = shared.state.lock();
    if state.heartbeat != HeartbeatState::Unavailable {
        state.heartbeat = HeartbeatState::Unavailable;
        state.touch_heartbeat();
    }
}

fn handle_heartbeat_sample(shared: &Shared, byte: u8) {
    let sample = protocol::heartbeat_sample(byte);

    let previous = {
        let mut state = shared.state.lock();
        let previous = state.heartbeat;
        state.heartbeat = sample;
        state.touch_heartbeat();

        if sample == HeartbeatState::TrippedClosing {
            // The monitor is in charge now; the controller will confirm
            // limits once it finishes.
            state.shutter_a = ShutterStatus::HeartbeatMonitorForceClosing;
            state.shutter_b = ShutterStatus::HeartbeatMonitorForceClosing;
            state.touch_status();
        }
        previous
    };

    if discriminant(&previous) == discriminant(&sample) {
        return;
    }

    match sample {
        HeartbeatState::TrippedClosing => {
            shared.log_warn("Heartbeat monitor is closing the dome")
        }
        HeartbeatState::TrippedIdle => {
            shared.log_warn("Heartbeat monitor finished closing the dome");
            if shared.config.has_legacy_controller {
                provoke_status_report(shared);
            }
        }
        HeartbeatState::Disabled => shared.log_info("Heartbeat monitor disabled"),
        HeartbeatState::Active { .. } => shared.log_info("Heartbeat monitor enabled"),
        HeartbeatState::Unavailable => {}
    }
}

/// The monitor may have interrupted the controller link mid-report; one
/// close step per side provokes a fresh limit byte.
fn provoke_status_report(shared: &Shared) {
    for side in [Side::A, Side::B] {
        if let Err(e) = shared.shutter_link.write_byte(side.close_command()) {
            log::warn!("Failed to write status provocation step: {}", e);
        }
        thread::sleep(shared.config.command_delay());
    }
}
