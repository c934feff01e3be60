//! Reconnectable byte link shared between a monitor loop and command writers
//!
//! Each link is single-reader (its monitor thread) and occasionally written
//! by the movement or command thread. The underlying port is locked only for
//! the brief instant of each poll or one-byte write, so a blocked read never
//! starves a writer; the controller is full-duplex.

use crate::error::{Error, Result};
use crate::transport::{Connect, Transport};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Granularity of the read poll loop
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub(crate) struct DomeLink {
    name: &'static str,
    connector: Mutex<Box<dyn Connect>>,
    port: Mutex<Option<Box<dyn Transport>>>,
    read_timeout: Duration,
    ever_connected: AtomicBool,
    shutdown: Arc<AtomicBool>,
}

impl DomeLink {
    pub fn new(
        name: &'static str,
        connector: Box<dyn Connect>,
        read_timeout: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        DomeLink {
            name,
            connector: Mutex::new(connector),
            port: Mutex::new(None),
            read_timeout,
            ever_connected: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.port.lock().is_some()
    }

    /// (Re)open the link, discarding any stale input and pending output.
    ///
    /// Returns `true` on the first-ever successful open, so the caller can
    /// distinguish "Established" from "Restored".
    pub fn connect(&self) -> Result<bool> {
        let mut transport = self.connector.lock().connect()?;
        transport.drain()?;

        *self.port.lock() = Some(transport);
        log::debug!("{}: link open", self.name);
        Ok(!self.ever_connected.swap(true, Ordering::Relaxed))
    }

    pub fn disconnect(&self) {
        *self.port.lock() = None;
        log::debug!("{}: link closed", self.name);
    }

    /// Write exactly one byte
    pub fn write_byte(&self, byte: u8) -> Result<()> {
        let mut guard = self.port.lock();
        let port = guard.as_mut().ok_or(Error::Disconnected)?;
        port.send_byte(byte)
    }

    /// Read one byte, blocking up to the configured timeout.
    ///
    /// `Ok(None)` means the timeout elapsed without a byte; whether that is
    /// an error is the caller's call (a legacy controller is silent when
    /// idle). I/O errors propagate so the monitor can drop the link.
    pub fn read_byte(&self) -> Result<Option<u8>> {
        let deadline = Instant::now() + self.read_timeout;
        loop {
            {
                let mut guard = self.port.lock();
                let port = guard.as_mut().ok_or(Error::Disconnected)?;
                if let Some(byte) = port.recv_byte()? {
                    return Ok(Some(byte));
                }
            }

            if self.shutdown.load(Ordering::Relaxed) || Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}
