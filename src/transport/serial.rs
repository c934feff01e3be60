//! Serial transport implementation

use super::{Connect, Transport};
use crate::error::{Error, Result};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;

/// Hardware read timeout. `recv_byte` only reads once the driver reports a
/// queued byte, so this bounds the rare race where that byte vanishes, not
/// the dome's configured read timeout (the link layer enforces that).
const PORT_TIMEOUT: Duration = Duration::from_millis(10);

/// Serial transport for the dome's UART links
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port at 8-N-1 framing
    ///
    /// # Arguments
    /// * `path` - Serial port path (e.g., "/dev/dome-controller")
    /// * `baud_rate` - Baud rate (e.g., 9600)
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(PORT_TIMEOUT)
            .open()?;

        log::info!("Opened serial port: {} at {} baud", path, baud_rate);

        Ok(SerialTransport { port })
    }
}

impl Transport for SerialTransport {
    fn recv_byte(&mut self) -> Result<Option<u8>> {
        if self.port.bytes_to_read()? == 0 {
            return Ok(None);
        }

        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => Ok(Some(byte[0])),
            // The queued byte evaporated before we got to it (driver race);
            // the caller polls again
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn send_byte(&mut self, byte: u8) -> Result<()> {
        let written = self.port.write(&[byte])?;
        if written != 1 {
            return Err(Error::ShortWrite(written));
        }
        self.port.flush()?;
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::All)?;
        Ok(())
    }
}

/// Reopens the same serial device on every connect.
pub struct SerialConnector {
    path: String,
    baud: u32,
}

impl SerialConnector {
    pub fn new(path: &str, baud: u32) -> Self {
        SerialConnector {
            path: path.to_string(),
            baud,
        }
    }
}

impl Connect for SerialConnector {
    fn connect(&mut self) -> Result<Box<dyn Transport>> {
        Ok(Box::new(SerialTransport::open(&self.path, self.baud)?))
    }
}
