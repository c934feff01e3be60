//! Byte-level protocols of the shutter controller and heartbeat monitor
//!
//! Both links are single-byte oriented with no framing, checksums or flow
//! control. Commands to the controller are single printable ASCII bytes
//! (`'a'`/`'A'`/`'b'`/`'B'` move, `'R'` resets the bumper-guard relay);
//! status arrives as asynchronously emitted bytes interpreted below. The
//! heartbeat monitor takes one byte of half-second countdown ticks and emits
//! one byte per sample.

use crate::types::{HeartbeatState, ShutterStatus};

/// Controller command: reset the bumper-guard relay
pub const BUMPER_RESET: u8 = b'R';

/// Heartbeat monitor command: sound the warning siren
pub const SIREN_REQUEST: u8 = 0xFF;

/// Heartbeat sample: watchdog disarmed
pub const HEARTBEAT_DISABLED: u8 = 0;
/// Heartbeat sample: the monitor is closing the dome
pub const HEARTBEAT_TRIPPED_CLOSING: u8 = 254;
/// Heartbeat sample: the monitor tripped and has finished closing
pub const HEARTBEAT_TRIPPED_IDLE: u8 = 255;

/// Exclusive upper bound on the arming countdown. The wire format carries
/// half-second ticks in one byte alongside the two trip markers, so it
/// cannot represent 120 s or more; the bound is enforced host-side.
pub const MAX_HEARTBEAT_TIMEOUT_SECONDS: i64 = 120;

/// Classification of a controller status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusByte {
    /// Shutter state was updated
    Updated,
    /// The bumper-guard relay reported a reset
    BumperReset,
    /// Not a status byte this controller generation emits
    Unknown,
}

/// An aggregate limit byte must not demote a side the per-side bytes have
/// already pinned fully open.
fn partial_unless_open(status: ShutterStatus) -> ShutterStatus {
    if status == ShutterStatus::Open {
        ShutterStatus::Open
    } else {
        ShutterStatus::PartiallyOpen
    }
}

/// Apply one controller status byte to the shutter state pair.
///
/// Aggregate bytes `'0'..'3'` report both limit switches; `'A'/'a'/'B'/'b'`
/// report movement per side (legacy controllers cannot distinguish direction
/// and report PARTIALLY OPEN instead); `'X'/'x'/'Y'/'y'` report a side
/// reaching its closed/open limit.
pub fn apply_status_byte(
    byte: u8,
    legacy: bool,
    a: &mut ShutterStatus,
    b: &mut ShutterStatus,
) -> StatusByte {
    let moving = |opening: bool| {
        if legacy {
            ShutterStatus::PartiallyOpen
        } else if opening {
            ShutterStatus::Opening
        } else {
            ShutterStatus::Closing
        }
    };

    match byte {
        b'0' => {
            *a = ShutterStatus::Closed;
            *b = ShutterStatus::Closed;
        }
        b'1' => {
            *a = ShutterStatus::Closed;
            *b = partial_unless_open(*b);
        }
        b'2' => {
            *a = partial_unless_open(*a);
            *b = ShutterStatus::Closed;
        }
        b'3' => {
            *a = partial_unless_open(*a);
            *b = partial_unless_open(*b);
        }
        b'A' => *a = moving(false),
        b'a' => *a = moving(true),
        b'X' => *a = ShutterStatus::Closed,
        b'x' => *a = ShutterStatus::Open,
        b'B' => *b = moving(false),
        b'b' => *b = moving(true),
        b'Y' => *b = ShutterStatus::Closed,
        b'y' => *b = ShutterStatus::Open,
        b'R' => return StatusByte::BumperReset,
        _ => return StatusByte::Unknown,
    }

    StatusByte::Updated
}

/// Interpret one heartbeat monitor sample byte.
pub fn heartbeat_sample(byte: u8) -> HeartbeatState {
    match byte {
        HEARTBEAT_DISABLED => HeartbeatState::Disabled,
        HEARTBEAT_TRIPPED_CLOSING => HeartbeatState::TrippedClosing,
        HEARTBEAT_TRIPPED_IDLE => HeartbeatState::TrippedIdle,
        ticks => HeartbeatState::Active {
            remaining: ticks as f32 / 2.0,
        },
    }
}

/// Encode an arming countdown as half-second ticks, or `None` when the
/// requested timeout cannot be represented on the wire.
pub fn arming_byte(timeout_seconds: i64) -> Option<u8> {
    if (0..MAX_HEARTBEAT_TIMEOUT_SECONDS).contains(&timeout_seconds) {
        Some((timeout_seconds * 2) as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(byte: u8, legacy: bool, a: ShutterStatus, b: ShutterStatus) -> (ShutterStatus, ShutterStatus, StatusByte) {
        let (mut a, mut b) = (a, b);
        let result = apply_status_byte(byte, legacy, &mut a, &mut b);
        (a, b, result)
    }

    #[test]
    fn test_both_closed_is_unconditional() {
        use ShutterStatus::*;
        for initial in [Open, PartiallyOpen, Opening, HeartbeatMonitorForceClosing] {
            let (a, b, result) = decode(b'0', false, initial, initial);
            assert_eq!(result, StatusByte::Updated);
            assert_eq!(a, Closed);
            assert_eq!(b, Closed);
        }
    }

    #[test]
    fn test_aggregate_partial_reports() {
        use ShutterStatus::*;
        let (a, b, _) = decode(b'1', false, Opening, Opening);
        assert_eq!((a, b), (Closed, PartiallyOpen));

        let (a, b, _) = decode(b'2', false, Closing, Closing);
        assert_eq!((a, b), (PartiallyOpen, Closed));

        let (a, b, _) = decode(b'3', false, Closed, Closed);
        assert_eq!((a, b), (PartiallyOpen, PartiallyOpen));
    }

    #[test]
    fn test_aggregate_never_demotes_open() {
        use ShutterStatus::*;
        assert_eq!(decode(b'1', false, Closed, Open).1, Open);
        assert_eq!(decode(b'2', false, Open, Closed).0, Open);

        let (a, b, _) = decode(b'3', false, Open, Open);
        assert_eq!((a, b), (Open, Open));
    }

    #[test]
    fn test_transition_bytes_modern() {
        use ShutterStatus::*;
        assert_eq!(decode(b'a', false, Closed, Closed).0, Opening);
        assert_eq!(decode(b'A', false, Open, Closed).0, Closing);
        assert_eq!(decode(b'b', false, Closed, Closed).1, Opening);
        assert_eq!(decode(b'B', false, Closed, Open).1, Closing);
    }

    #[test]
    fn test_transition_bytes_legacy() {
        use ShutterStatus::*;
        assert_eq!(decode(b'a', true, Closed, Closed).0, PartiallyOpen);
        assert_eq!(decode(b'A', true, Open, Closed).0, PartiallyOpen);
        assert_eq!(decode(b'B', true, Closed, Open).1, PartiallyOpen);
    }

    #[test]
    fn test_limit_bytes() {
        use ShutterStatus::*;
        assert_eq!(decode(b'x', false, Opening, Closed).0, Open);
        assert_eq!(decode(b'X', false, Closing, Closed).0, Closed);
        assert_eq!(decode(b'y', false, Closed, Opening).1, Open);
        assert_eq!(decode(b'Y', false, Closed, Closing).1, Closed);
    }

    #[test]
    fn test_housekeeping_bytes_leave_state_alone() {
        use ShutterStatus::*;
        let (a, b, result) = decode(b'R', false, Opening, Closing);
        assert_eq!(result, StatusByte::BumperReset);
        assert_eq!((a, b), (Opening, Closing));

        let (a, b, result) = decode(b'?', false, Opening, Closing);
        assert_eq!(result, StatusByte::Unknown);
        assert_eq!((a, b), (Opening, Closing));
    }

    #[test]
    fn test_heartbeat_samples() {
        assert_eq!(heartbeat_sample(0), HeartbeatState::Disabled);
        assert_eq!(heartbeat_sample(254), HeartbeatState::TrippedClosing);
        assert_eq!(heartbeat_sample(255), HeartbeatState::TrippedIdle);
        assert_eq!(
            heartbeat_sample(119),
            HeartbeatState::Active { remaining: 59.5 }
        );
        assert_eq!(
            heartbeat_sample(1),
            HeartbeatState::Active { remaining: 0.5 }
        );
    }

    #[test]
    fn test_arming_byte_bounds() {
        assert_eq!(arming_byte(0), Some(0x00));
        assert_eq!(arming_byte(119), Some(0xEE));
        assert_eq!(arming_byte(120), None);
        assert_eq!(arming_byte(-1), None);
    }
}
