//! Observatory event sink
//!
//! The supervisor reports operator-facing events (contact established, dome
//! opening, heartbeat trips) through this trait rather than calling the log
//! macros directly, so the observatory log service can be swapped in without
//! touching the core and tests can capture what was said.

/// Sink for operator-facing observatory events.
pub trait EventSink: Send + Sync {
    fn info(&self, source: &str, message: &str);
    fn warn(&self, source: &str, message: &str);
    fn error(&self, source: &str, message: &str);
}

/// Default sink: forwards events to the process log.
pub struct DaemonLog;

impl EventSink for DaemonLog {
    fn info(&self, source: &str, message: &str) {
        log::info!("{}: {}", source, message);
    }

    fn warn(&self, source: &str, message: &str) {
        log::warn!("{}: {}", source, message);
    }

    fn error(&self, source: &str, message: &str) {
        log::error!("{}: {}", source, message);
    }
}
