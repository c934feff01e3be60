//! End-to-end supervisor scenarios over mock serial links
//!
//! Each test builds a full supervisor with both monitor threads running,
//! injects controller/heartbeat bytes from timed threads and observes the
//! byte stream written to the mocks and the events reported to the sink.

use cupolad::belt::BeltSensors;
use cupolad::config::{BeltSensorNames, Config, SideLabels};
use cupolad::events::EventSink;
use cupolad::transport::{MockConnector, MockTransport};
use cupolad::{CommandOutcome, DomeSupervisor, HeartbeatState, ShutterStatus, Side};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn test_config() -> Config {
    Config {
        log_name: "dome".to_string(),
        bind_address: "127.0.0.1:0".to_string(),
        control_ips: vec![],
        serial_port: "/dev/null".to_string(),
        serial_baud: 9600,
        serial_timeout: 10.0,
        command_delay: 0.01,
        step_command_delay: 0.02,
        shutter_timeout: 5.0,
        has_legacy_controller: false,
        has_bumper_guard: false,
        slow_open_steps: 0,
        heartbeat_port: "/dev/null".to_string(),
        heartbeat_baud: 9600,
        heartbeat_timeout: 10.0,
        sides: HashMap::from([
            ("east".to_string(), "a".to_string()),
            ("west".to_string(), "b".to_string()),
            ("both".to_string(), "ab".to_string()),
        ]),
        side_labels: SideLabels {
            a: "east".to_string(),
            b: "west".to_string(),
        },
        invert_on_close: false,
        domealert_address: None,
        domealert_belt_sensors: BeltSensorNames::default(),
    }
}

/// Event sink that records every message for later inspection
#[derive(Clone, Default)]
struct CaptureSink {
    messages: Arc<Mutex<Vec<String>>>,
}

impl CaptureSink {
    fn contains(&self, needle: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.contains(needle))
    }
}

impl EventSink for CaptureSink {
    fn info(&self, _source: &str, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }

    fn warn(&self, _source: &str, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }

    fn error(&self, _source: &str, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

struct Rig {
    supervisor: Arc<DomeSupervisor>,
    controller: MockTransport,
    heartbeat: MockTransport,
    events: CaptureSink,
}

fn start_rig(config: Config, belt: Option<Box<dyn BeltSensors>>) -> Rig {
    let controller = MockTransport::new();
    let heartbeat = MockTransport::new();
    let events = CaptureSink::default();

    let supervisor = DomeSupervisor::new(
        config,
        Box::new(MockConnector::new(controller.clone())),
        Box::new(MockConnector::new(heartbeat.clone())),
        belt,
        Box::new(events.clone()),
    );
    supervisor.start().unwrap();
    let supervisor = Arc::new(supervisor);

    // Let the monitors connect, then silence the pre-movement siren so
    // tests are not paced by the five-second warning period
    thread::sleep(Duration::from_millis(50));
    assert_eq!(
        supervisor.set_heartbeat_siren(true, false),
        CommandOutcome::Succeeded
    );

    Rig {
        supervisor,
        controller,
        heartbeat,
        events,
    }
}

#[test]
fn full_open_one_side() {
    let rig = start_rig(test_config(), None);

    let controller = rig.controller.clone();
    let injector = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        controller.inject_read(b"a"); // opening
        thread::sleep(Duration::from_millis(80));
        controller.inject_read(b"x"); // open limit
    });

    let outcome = rig.supervisor.open_shutters(true, "a", 0);
    injector.join().unwrap();

    assert_eq!(outcome, CommandOutcome::Succeeded);
    let status = rig.supervisor.status().unwrap();
    assert_eq!(status.shutter_a, ShutterStatus::Open);
    assert!(!status.closed);

    // Every byte on the wire was an open step for side a
    let written = rig.controller.get_written();
    assert!(!written.is_empty());
    assert!(written.iter().all(|&b| b == b'a'));
}

#[test]
fn open_times_out_without_limit_report() {
    let mut config = test_config();
    config.shutter_timeout = 0.3;
    let rig = start_rig(config, None);

    rig.controller.inject_read(b"a");

    let outcome = rig.supervisor.open_shutters(true, "a", 0);
    assert_eq!(outcome, CommandOutcome::Failed);
    assert!(rig.events.contains("Failed to open dome"));

    // The controller never reported a limit, so the last word stands
    let status = rig.supervisor.status().unwrap();
    assert_eq!(status.shutter_a, ShutterStatus::Opening);
}

#[test]
fn stop_interrupts_movement_and_frees_the_mutex() {
    let rig = start_rig(test_config(), None);

    rig.controller.inject_read(b"a");

    let supervisor = Arc::clone(&rig.supervisor);
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        supervisor.stop(true)
    });

    let outcome = rig.supervisor.open_shutters(true, "a", 0);
    assert_eq!(outcome, CommandOutcome::Failed);
    assert_eq!(stopper.join().unwrap(), CommandOutcome::Succeeded);

    // The command mutex is immediately reacquirable
    assert_eq!(
        rig.supervisor.set_engineering_mode(true, true),
        CommandOutcome::Succeeded
    );
    assert_eq!(
        rig.supervisor.set_engineering_mode(true, false),
        CommandOutcome::Succeeded
    );
}

#[test]
fn heartbeat_trip_interrupts_open() {
    let rig = start_rig(test_config(), None);

    rig.controller.inject_read(b"a");

    let heartbeat = rig.heartbeat.clone();
    let tripper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        heartbeat.inject_read(&[254]);
    });

    let outcome = rig.supervisor.open_shutters(true, "a", 0);
    tripper.join().unwrap();

    assert_eq!(outcome, CommandOutcome::Failed);
    let status = rig.supervisor.status().unwrap();
    assert_eq!(status.shutter_a, ShutterStatus::HeartbeatMonitorForceClosing);
    assert_eq!(status.shutter_b, ShutterStatus::HeartbeatMonitorForceClosing);
    assert_eq!(status.heartbeat, HeartbeatState::TrippedClosing);
    assert!(rig.events.contains("Heartbeat monitor is closing the dome"));
}

/// Belt sensor stub that reports slack from the nth read onwards
struct SlackAfter {
    threshold: u32,
    calls: AtomicU32,
}

impl BeltSensors for SlackAfter {
    fn belt_tensioned(&self, side: Side) -> cupolad::Result<Option<bool>> {
        if side != Side::A {
            return Ok(None);
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(call < self.threshold))
    }
}

#[test]
fn stepped_open_aborts_on_slack_belt() {
    let belt = SlackAfter {
        threshold: 2,
        calls: AtomicU32::new(0),
    };
    let rig = start_rig(test_config(), Some(Box::new(belt)));

    let outcome = rig.supervisor.open_shutters(true, "a", 3);
    assert_eq!(outcome, CommandOutcome::Failed);
    assert!(rig.events.contains("belt is slack"));

    // Aborted at step 2 of 3: exactly two step commands went out
    assert_eq!(rig.controller.get_written(), vec![b'a', b'a']);
}

#[test]
fn heartbeat_arming_bounds() {
    let rig = start_rig(test_config(), None);

    rig.heartbeat.inject_read(&[0]); // monitor reports disabled
    thread::sleep(Duration::from_millis(50));

    assert_eq!(
        rig.supervisor.set_heartbeat_timer(true, 0),
        CommandOutcome::Succeeded
    );
    assert_eq!(
        rig.supervisor.set_heartbeat_timer(true, 119),
        CommandOutcome::Succeeded
    );
    assert_eq!(rig.heartbeat.get_written(), vec![0x00, 0xEE]);

    assert_eq!(
        rig.supervisor.set_heartbeat_timer(true, 120),
        CommandOutcome::HeartbeatInvalidTimeout
    );
    assert_eq!(
        rig.supervisor.set_heartbeat_timer(true, -1),
        CommandOutcome::HeartbeatInvalidTimeout
    );

    // Out-of-range requests put nothing on the wire
    assert_eq!(rig.heartbeat.get_written(), vec![0x00, 0xEE]);
}

#[test]
fn arming_requires_monitor_contact() {
    let rig = start_rig(test_config(), None);

    // No sample has ever arrived, so the monitor is unavailable
    assert_eq!(
        rig.supervisor.set_heartbeat_timer(true, 30),
        CommandOutcome::HeartbeatUnavailable
    );
}

#[test]
fn unauthorized_callers_are_refused() {
    let rig = start_rig(test_config(), None);

    assert_eq!(
        rig.supervisor.open_shutters(false, "a", 0),
        CommandOutcome::InvalidControlIP
    );
    assert_eq!(
        rig.supervisor.close_shutters(false, "a", 0),
        CommandOutcome::InvalidControlIP
    );
    assert_eq!(rig.supervisor.stop(false), CommandOutcome::InvalidControlIP);
    assert_eq!(
        rig.supervisor.set_heartbeat_timer(false, 10),
        CommandOutcome::InvalidControlIP
    );
}

#[test]
fn engineering_mode_round_trip() {
    let rig = start_rig(test_config(), None);

    assert_eq!(
        rig.supervisor.set_engineering_mode(true, true),
        CommandOutcome::Succeeded
    );
    assert_eq!(
        rig.supervisor.open_shutters(true, "a", 0),
        CommandOutcome::EngineeringModeActive
    );
    assert_eq!(
        rig.supervisor.set_heartbeat_timer(true, 10),
        CommandOutcome::EngineeringModeActive
    );

    assert_eq!(
        rig.supervisor.set_engineering_mode(true, false),
        CommandOutcome::Succeeded
    );

    // Both sides report closed, so a close is accepted and trivially done
    assert_eq!(
        rig.supervisor.close_shutters(true, "ab", 0),
        CommandOutcome::Succeeded
    );
}

#[test]
fn engineering_mode_requires_heartbeat_disabled() {
    let rig = start_rig(test_config(), None);

    rig.heartbeat.inject_read(&[60]); // armed, 30s remaining
    thread::sleep(Duration::from_millis(50));

    assert_eq!(
        rig.supervisor.set_engineering_mode(true, true),
        CommandOutcome::EngineeringModeRequiresHeartbeatDisabled
    );

    let status = rig.supervisor.status().unwrap();
    assert_eq!(status.heartbeat, HeartbeatState::Active { remaining: 30.0 });
    assert_eq!(status.heartbeat_remaining, 30.0);
}

#[test]
fn trip_is_absorbing_until_monitor_reports_otherwise() {
    let rig = start_rig(test_config(), None);

    rig.heartbeat.inject_read(&[254]);
    thread::sleep(Duration::from_millis(50));

    let status = rig.supervisor.status().unwrap();
    assert_eq!(status.heartbeat, HeartbeatState::TrippedClosing);
    assert_eq!(status.shutter_a, ShutterStatus::HeartbeatMonitorForceClosing);

    assert_eq!(
        rig.supervisor.open_shutters(true, "ab", 0),
        CommandOutcome::HeartbeatCloseInProgress
    );
    assert_eq!(
        rig.supervisor.stop(true),
        CommandOutcome::HeartbeatCloseInProgress
    );

    rig.heartbeat.inject_read(&[255]);
    thread::sleep(Duration::from_millis(50));

    assert_eq!(
        rig.supervisor.open_shutters(true, "ab", 0),
        CommandOutcome::HeartbeatTimedOut
    );
    // Disarming from the tripped state is allowed, rearming is not
    assert_eq!(
        rig.supervisor.set_heartbeat_timer(true, 0),
        CommandOutcome::Succeeded
    );
    assert_eq!(
        rig.supervisor.set_heartbeat_timer(true, 30),
        CommandOutcome::HeartbeatTimedOut
    );

    rig.heartbeat.inject_read(&[0]);
    rig.controller.inject_read(b"0"); // controller confirms both closed
    thread::sleep(Duration::from_millis(50));

    let status = rig.supervisor.status().unwrap();
    assert_eq!(status.heartbeat, HeartbeatState::Disabled);
    assert!(status.closed);
    assert_eq!(
        rig.supervisor.close_shutters(true, "ab", 0),
        CommandOutcome::Succeeded
    );
}

#[test]
fn slack_belt_during_ramp_skips_full_speed_travel() {
    let mut config = test_config();
    config.slow_open_steps = 3;
    let belt = SlackAfter {
        threshold: 1, // slack from the first read
        calls: AtomicU32::new(0),
    };
    let rig = start_rig(config, Some(Box::new(belt)));

    let outcome = rig.supervisor.open_shutters(true, "a", 0);
    assert_eq!(outcome, CommandOutcome::Failed);
    assert!(rig.events.contains("belt is slack"));

    // The ramp aborted on its first step and no full-speed phase followed
    assert_eq!(rig.controller.get_written(), vec![b'a']);
}

#[test]
fn legacy_controller_is_prodded_after_a_trip() {
    let mut config = test_config();
    config.has_legacy_controller = true;
    let rig = start_rig(config, None);

    rig.heartbeat.inject_read(&[255]);
    thread::sleep(Duration::from_millis(200));

    assert!(rig.events.contains("finished closing the dome"));
    // One close step per side provokes a fresh limit report
    assert_eq!(rig.controller.get_written(), vec![b'A', b'B']);
}

#[test]
fn stepped_open_honors_requested_order() {
    let rig = start_rig(test_config(), None);

    let outcome = rig.supervisor.open_shutters(true, "ba", 1);
    assert_eq!(outcome, CommandOutcome::Succeeded);
    assert_eq!(rig.controller.get_written(), vec![b'b', b'a']);
}

#[test]
fn concurrent_commands_are_blocked() {
    let mut config = test_config();
    config.shutter_timeout = 1.0;
    let rig = start_rig(config, None);

    let supervisor = Arc::clone(&rig.supervisor);
    let mover = thread::spawn(move || supervisor.open_shutters(true, "a", 0));
    thread::sleep(Duration::from_millis(100));

    assert_eq!(
        rig.supervisor.open_shutters(true, "b", 0),
        CommandOutcome::Blocked
    );

    // The first movement times out on its own
    assert_eq!(mover.join().unwrap(), CommandOutcome::Failed);
}

#[test]
fn siren_toggle_is_idempotent() {
    let rig = start_rig(test_config(), None);

    assert_eq!(
        rig.supervisor.set_heartbeat_siren(true, true),
        CommandOutcome::Succeeded
    );
    let first = rig.supervisor.status().unwrap();
    assert_eq!(
        rig.supervisor.set_heartbeat_siren(true, true),
        CommandOutcome::Succeeded
    );
    let second = rig.supervisor.status().unwrap();

    assert!(first.siren_enabled);
    assert_eq!(first.siren_enabled, second.siren_enabled);
}
