//! Shared dome state
//!
//! Written by the two monitor loops and the command surface, read by
//! everything. All fields live under the supervisor's status mutex.

use crate::types::{HeartbeatState, ShutterStatus, Side};
use std::time::{SystemTime, UNIX_EPOCH};

/// Mutable dome state shared across the monitor, movement and RPC threads
#[derive(Debug, Clone)]
pub struct DomeState {
    pub shutter_a: ShutterStatus,
    pub shutter_b: ShutterStatus,
    /// When the controller last reported (unix microseconds, 0 = never)
    pub status_timestamp_us: u64,

    pub heartbeat: HeartbeatState,
    /// When the heartbeat monitor last emitted a sample
    pub heartbeat_timestamp_us: u64,

    /// Software interlock refusing all movement and arming commands
    pub engineering_mode: bool,
    /// Sound the warning siren before movements
    pub siren_enabled: bool,
}

impl DomeState {
    pub fn shutter(&self, side: Side) -> ShutterStatus {
        match side {
            Side::A => self.shutter_a,
            Side::B => self.shutter_b,
        }
    }

    pub fn set_shutter(&mut self, side: Side, status: ShutterStatus) {
        match side {
            Side::A => self.shutter_a = status,
            Side::B => self.shutter_b = status,
        }
    }

    /// Stamp the controller status time with the current instant
    pub fn touch_status(&mut self) {
        self.status_timestamp_us = now_us();
    }

    /// Stamp the heartbeat sample time with the current instant
    pub fn touch_heartbeat(&mut self) {
        self.heartbeat_timestamp_us = now_us();
    }
}

impl Default for DomeState {
    fn default() -> Self {
        Self {
            // Convention only; overwritten by the first controller byte
            shutter_a: ShutterStatus::Closed,
            shutter_b: ShutterStatus::Closed,
            status_timestamp_us: 0,
            heartbeat: HeartbeatState::Unavailable,
            heartbeat_timestamp_us: 0,
            engineering_mode: false,
            siren_enabled: true,
        }
    }
}

fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
