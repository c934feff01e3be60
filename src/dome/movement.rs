//! Movement driver
//!
//! A movement is a timed sequence of identical single-byte step commands,
//! supervised between steps against four termination conditions: operator
//! stop, heartbeat trip, the travel-limit predicate, and the overall
//! timeout. Only the predicate counts as success.

use super::link::DomeLink;
use super::protocol;
use super::Shared;
use crate::types::{ShutterStatus, Side};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

/// Audible warning period between the siren request and the first step
const SIREN_WARNING: Duration = Duration::from_secs(5);

/// Goal predicate for one movement, re-evaluated after every step.
///
/// Implementations hold their side and any sensor bindings explicitly so a
/// limit built for side `a` can never silently observe side `b`.
pub(crate) trait TravelLimit {
    fn reached(&mut self, steps: u32) -> bool;
}

/// Open-movement limit: the side reports fully open, the belt goes slack,
/// or the bounded step budget is spent.
pub(crate) struct OpenLimit<'a> {
    shared: &'a Shared,
    side: Side,
    max_steps: u32,
    /// Set when the belt sensor ended the movement; the attempt has failed
    /// even though the predicate returned true.
    pub belt_slack: bool,
}

impl<'a> OpenLimit<'a> {
    pub fn new(shared: &'a Shared, side: Side, max_steps: u32) -> Self {
        OpenLimit {
            shared,
            side,
            max_steps,
            belt_slack: false,
        }
    }
}

impl TravelLimit for OpenLimit<'_> {
    fn reached(&mut self, steps: u32) -> bool {
        if self.shared.state.lock().shutter(self.side) == ShutterStatus::Open {
            return true;
        }

        if self.shared.belt_slack(self.side) {
            self.belt_slack = true;
            let label = self.shared.config.side_labels.get(self.side);
            self.shared
                .log_error(&format!("Aborting movement: {} belt is slack", label));
            return true;
        }

        self.max_steps > 0 && steps >= self.max_steps
    }
}

/// Close-movement limit: the side reports fully closed or the bounded step
/// budget is spent. Belt tension is irrelevant when closing.
pub(crate) struct CloseLimit<'a> {
    shared: &'a Shared,
    side: Side,
    max_steps: u32,
}

impl<'a> CloseLimit<'a> {
    pub fn new(shared: &'a Shared, side: Side, max_steps: u32) -> Self {
        CloseLimit {
            shared,
            side,
            max_steps,
        }
    }
}

impl TravelLimit for CloseLimit<'_> {
    fn reached(&mut self, steps: u32) -> bool {
        if self.shared.state.lock().shutter(self.side) == ShutterStatus::Closed {
            return true;
        }
        self.max_steps > 0 && steps >= self.max_steps
    }
}

impl Shared {
    /// Drive one shutter with repeated `command` bytes until a termination
    /// condition is met.
    ///
    /// Returns `true` iff the movement ended because `limit` was reached;
    /// stop, heartbeat trip and timeout all return `false`. A zero `timeout`
    /// disables the time budget (bounded moves are limited by their step
    /// count instead).
    pub(crate) fn move_shutter(
        &self,
        command: u8,
        limit: &mut dyn TravelLimit,
        step_delay: Duration,
        timeout: Duration,
        siren: bool,
    ) -> bool {
        if self.config.has_bumper_guard {
            self.write_logged(&self.shutter_link, protocol::BUMPER_RESET, "bumper guard reset");
            thread::sleep(step_delay);
        }

        if siren && self.state.lock().siren_enabled {
            self.write_logged(&self.heartbeat_link, protocol::SIREN_REQUEST, "siren request");
            thread::sleep(SIREN_WARNING);
        }

        let start = Instant::now();
        let mut steps = 0u32;
        loop {
            self.write_logged(&self.shutter_link, command, "step command");
            steps += 1;
            thread::sleep(step_delay);

            if self.force_stopped.load(Ordering::Relaxed) {
                return false;
            }
            if self.state.lock().heartbeat.is_tripped() {
                return false;
            }
            if limit.reached(steps) {
                return true;
            }
            if !timeout.is_zero() && start.elapsed() > timeout {
                return false;
            }
        }
    }

    /// Open one side: either a bounded step move, or a full open optionally
    /// preceded by the slow belt-slack ramp. Returns success for this side.
    pub(crate) fn open_side(&self, side: Side, steps: u32, siren: &mut bool) -> bool {
        let command = side.open_command();

        if steps > 0 {
            let mut limit = OpenLimit::new(self, side, steps);
            let reached = self.move_shutter(
                command,
                &mut limit,
                self.config.step_command_delay(),
                Duration::ZERO,
                std::mem::take(siren),
            );
            return reached && !limit.belt_slack;
        }

        if self.config.slow_open_steps > 0 {
            // take up belt slack before full-speed travel
            let mut ramp = OpenLimit::new(self, side, self.config.slow_open_steps);
            let reached = self.move_shutter(
                command,
                &mut ramp,
                self.config.step_command_delay(),
                Duration::ZERO,
                std::mem::take(siren),
            );
            if ramp.belt_slack || !reached {
                return false;
            }
        }

        let mut limit = OpenLimit::new(self, side, 0);
        let reached = self.move_shutter(
            command,
            &mut limit,
            self.config.command_delay(),
            self.config.shutter_timeout(),
            std::mem::take(siren),
        );
        reached && !limit.belt_slack
    }

    /// Close one side, bounded by `steps` when non-zero.
    pub(crate) fn close_side(&self, side: Side, steps: u32, siren: &mut bool) -> bool {
        let (step_delay, timeout) = if steps > 0 {
            (self.config.step_command_delay(), Duration::ZERO)
        } else {
            (self.config.command_delay(), self.config.shutter_timeout())
        };

        let mut limit = CloseLimit::new(self, side, steps);
        self.move_shutter(
            side.close_command(),
            &mut limit,
            step_delay,
            timeout,
            std::mem::take(siren),
        )
    }

    fn write_logged(&self, link: &DomeLink, byte: u8, what: &str) {
        if let Err(e) = link.write_byte(byte) {
            log::warn!("Failed to write {} (0x{:02X}): {}", what, byte, e);
        }
    }
}
