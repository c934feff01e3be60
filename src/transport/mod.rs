//! Byte transports for the two dome links
//!
//! Both the shutter controller and the heartbeat monitor speak one byte at a
//! time with no framing, so the transport contract is byte-oriented and
//! non-blocking: `recv_byte` reports what the device has already emitted and
//! returns immediately, leaving the timed wait to the link layer, which
//! polls between brief lock holds so command writes are never stuck behind a
//! blocked reader.

use crate::error::Result;

mod mock;
mod serial;

pub use mock::{MockConnector, MockTransport};
pub use serial::{SerialConnector, SerialTransport};

/// One end of a dome serial link.
pub trait Transport: Send {
    /// Next byte the device has emitted, or `None` when nothing is queued.
    /// Never blocks; the link layer owns the read timeout.
    fn recv_byte(&mut self) -> Result<Option<u8>>;

    /// Put a single command byte on the wire and push it out. Fails unless
    /// exactly one byte leaves the host.
    fn send_byte(&mut self, byte: u8) -> Result<()>;

    /// Discard everything queued in either direction. Called on every
    /// (re)open so a fresh session never replays stale status bytes.
    fn drain(&mut self) -> Result<()>;
}

/// Factory that (re)opens a transport.
///
/// The monitor loops close a link on any I/O error and reopen it through
/// this trait five seconds later, so a transport must be constructible any
/// number of times over the daemon's life.
pub trait Connect: Send {
    fn connect(&mut self) -> Result<Box<dyn Transport>>;
}
