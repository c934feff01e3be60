//! Mock transport for testing
//!
//! A simulated dome device: tests play the controller or heartbeat monitor
//! by queueing the bytes it would emit, and assert on the exact command
//! bytes the supervisor sent. The wire record survives reconnect cycles so
//! a test can observe traffic across a link drop.

use super::{Connect, Transport};
use crate::error::Result;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Wire {
    /// Bytes the simulated device has emitted but the supervisor has not
    /// yet consumed
    pending: VecDeque<u8>,
    /// Every command byte the supervisor ever sent, in order
    sent: Vec<u8>,
}

/// Mock dome device for unit testing
#[derive(Clone, Default)]
pub struct MockTransport {
    wire: Arc<Mutex<Wire>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit bytes from the simulated device
    pub fn inject_read(&self, data: &[u8]) {
        self.wire.lock().unwrap().pending.extend(data);
    }

    /// The supervisor's complete transmission record
    pub fn get_written(&self) -> Vec<u8> {
        self.wire.lock().unwrap().sent.clone()
    }
}

impl Transport for MockTransport {
    fn recv_byte(&mut self) -> Result<Option<u8>> {
        Ok(self.wire.lock().unwrap().pending.pop_front())
    }

    fn send_byte(&mut self, byte: u8) -> Result<()> {
        self.wire.lock().unwrap().sent.push(byte);
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        // Only the device side is discarded; the transmission record is
        // test evidence and outlives reconnects
        self.wire.lock().unwrap().pending.clear();
        Ok(())
    }
}

/// Hands out handles onto the same simulated device on every connect, so a
/// dropped link reconnects to the dome the test is still scripting.
pub struct MockConnector {
    transport: MockTransport,
}

impl MockConnector {
    pub fn new(transport: MockTransport) -> Self {
        MockConnector { transport }
    }
}

impl Connect for MockConnector {
    fn connect(&mut self) -> Result<Box<dyn Transport>> {
        Ok(Box::new(self.transport.clone()))
    }
}
