//! Shared dome vocabulary: sides, shutter and heartbeat states, command
//! outcomes and the status snapshot returned to RPC callers.
//!
//! Numeric codes and display labels follow the existing RPC contract of the
//! dome control stack, so snapshots serialize states as their codes.

use serde::ser::Serializer;
use serde::Serialize;

/// One of the two mechanically independent dome halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn from_char(c: char) -> Option<Side> {
        match c {
            'a' => Some(Side::A),
            'b' => Some(Side::B),
            _ => None,
        }
    }

    /// Single-byte open command for this side. Case alone selects direction.
    pub fn open_command(self) -> u8 {
        match self {
            Side::A => b'a',
            Side::B => b'b',
        }
    }

    /// Single-byte close command for this side.
    pub fn close_command(self) -> u8 {
        match self {
            Side::A => b'A',
            Side::B => b'B',
        }
    }
}

/// Status of one dome shutter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutterStatus {
    Closed,
    Open,
    PartiallyOpen,
    Opening,
    Closing,
    HeartbeatMonitorForceClosing,
}

impl ShutterStatus {
    pub fn code(self) -> u8 {
        match self {
            ShutterStatus::Closed => 0,
            ShutterStatus::Open => 1,
            ShutterStatus::PartiallyOpen => 2,
            ShutterStatus::Opening => 3,
            ShutterStatus::Closing => 4,
            ShutterStatus::HeartbeatMonitorForceClosing => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ShutterStatus::Closed => "CLOSED",
            ShutterStatus::Open => "OPEN",
            ShutterStatus::PartiallyOpen => "PARTIALLY OPEN",
            ShutterStatus::Opening => "OPENING",
            ShutterStatus::Closing => "CLOSING",
            ShutterStatus::HeartbeatMonitorForceClosing => "FORCE CLOSING",
        }
    }
}

impl Serialize for ShutterStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Status of the heartbeat monitor hardware.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeartbeatState {
    Disabled,
    /// Armed and counting down; payload is the remaining seconds.
    Active { remaining: f32 },
    /// The monitor is driving the dome closed right now.
    TrippedClosing,
    /// The monitor has tripped and finished closing.
    TrippedIdle,
    /// The monitor link is down; heartbeat-dependent commands are refused.
    Unavailable,
}

impl HeartbeatState {
    pub fn code(self) -> u8 {
        match self {
            HeartbeatState::Disabled => 0,
            HeartbeatState::Active { .. } => 1,
            HeartbeatState::TrippedClosing => 2,
            HeartbeatState::TrippedIdle => 3,
            HeartbeatState::Unavailable => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HeartbeatState::Disabled => "DISABLED",
            HeartbeatState::Active { .. } => "ACTIVE",
            HeartbeatState::TrippedClosing => "CLOSING DOME",
            HeartbeatState::TrippedIdle => "TRIPPED",
            HeartbeatState::Unavailable => "UNAVAILABLE",
        }
    }

    /// Seconds left on the countdown (zero in every non-active state).
    pub fn remaining(self) -> f32 {
        match self {
            HeartbeatState::Active { remaining } => remaining,
            _ => 0.0,
        }
    }

    /// Both tripped states are absorbing until the monitor reports otherwise.
    pub fn is_tripped(self) -> bool {
        matches!(
            self,
            HeartbeatState::TrippedClosing | HeartbeatState::TrippedIdle
        )
    }
}

impl Serialize for HeartbeatState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Flat command result codes returned through the RPC surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Succeeded,
    Failed,
    Blocked,
    HeartbeatTimedOut,
    HeartbeatCloseInProgress,
    HeartbeatUnavailable,
    HeartbeatInvalidTimeout,
    EngineeringModeRequiresHeartbeatDisabled,
    EngineeringModeActive,
    InvalidControlIP,
}

impl CommandOutcome {
    pub fn code(self) -> u8 {
        match self {
            CommandOutcome::Succeeded => 0,
            CommandOutcome::Failed => 1,
            CommandOutcome::Blocked => 2,
            CommandOutcome::HeartbeatTimedOut => 3,
            CommandOutcome::HeartbeatCloseInProgress => 4,
            CommandOutcome::HeartbeatUnavailable => 5,
            CommandOutcome::HeartbeatInvalidTimeout => 6,
            CommandOutcome::EngineeringModeRequiresHeartbeatDisabled => 7,
            CommandOutcome::EngineeringModeActive => 8,
            CommandOutcome::InvalidControlIP => 10,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            CommandOutcome::Succeeded => "ok",
            CommandOutcome::Failed => "error: command failed",
            CommandOutcome::Blocked => "error: another command is already running",
            CommandOutcome::HeartbeatTimedOut => "error: heartbeat monitor has tripped",
            CommandOutcome::HeartbeatCloseInProgress => {
                "error: heartbeat monitor is closing the dome"
            }
            CommandOutcome::HeartbeatUnavailable => "error: heartbeat monitor is not available",
            CommandOutcome::HeartbeatInvalidTimeout => {
                "error: heartbeat timeout must be less than 120s"
            }
            CommandOutcome::EngineeringModeRequiresHeartbeatDisabled => {
                "error: heartbeat monitor must be disabled before enabling engineering mode"
            }
            CommandOutcome::EngineeringModeActive => "error: dome is in engineering mode",
            CommandOutcome::InvalidControlIP => "error: command not accepted from this IP",
        }
    }
}

impl Serialize for CommandOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Point-in-time view of the dome, assembled by `status()`.
///
/// All fields are always present; the belt fields are omitted from the wire
/// encoding when no sensor is bound for that side.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// When the controller last reported shutter state (unix microseconds,
    /// zero before the first status byte).
    pub timestamp_us: u64,
    pub shutter_a: ShutterStatus,
    pub shutter_a_label: &'static str,
    pub shutter_b: ShutterStatus,
    pub shutter_b_label: &'static str,
    /// True when both sides are fully closed.
    pub closed: bool,
    pub engineering_mode: bool,
    /// When the heartbeat monitor last emitted a sample (unix microseconds).
    pub heartbeat_timestamp_us: u64,
    pub heartbeat: HeartbeatState,
    pub heartbeat_label: &'static str,
    pub heartbeat_remaining: f32,
    pub siren_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub belt_a_tensioned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub belt_b_tensioned: Option<bool>,
}
