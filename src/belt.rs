//! Belt-tension oracle
//!
//! Multi-segment domes can shed a drive belt if a shutter is driven while
//! the belt is slack. When the observatory has tension sensors, the
//! supervisor consults this oracle between movement steps and before
//! reporting status. The sensors live on a separate dome sensor daemon,
//! queried over a line-oriented JSON socket.

use crate::config::BeltSensorNames;
use crate::error::{Error, Result};
use crate::types::Side;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

const QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Oracle over the per-side belt-tension sensors.
pub trait BeltSensors: Send + Sync {
    /// Tension state of the side's belt; `None` when no sensor is bound
    /// for that side.
    fn belt_tensioned(&self, side: Side) -> Result<Option<bool>>;
}

/// Client for the external dome sensor daemon
pub struct DomeAlertClient {
    address: String,
    sensors: BeltSensorNames,
}

#[derive(Deserialize)]
struct SensorReply {
    value: bool,
}

impl DomeAlertClient {
    pub fn new(address: &str, sensors: BeltSensorNames) -> Self {
        DomeAlertClient {
            address: address.to_string(),
            sensors,
        }
    }

    fn query(&self, sensor: &str) -> Result<bool> {
        let addr = self
            .address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::BeltSensor(format!("cannot resolve {}", self.address)))?;

        let stream = TcpStream::connect_timeout(&addr, QUERY_TIMEOUT)?;
        stream.set_read_timeout(Some(QUERY_TIMEOUT))?;
        stream.set_write_timeout(Some(QUERY_TIMEOUT))?;

        let mut writer = stream.try_clone()?;
        writeln!(writer, "{}", serde_json::json!({ "sensor": sensor }))?;

        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line)?;
        let reply: SensorReply = serde_json::from_str(line.trim())
            .map_err(|e| Error::BeltSensor(format!("bad reply from sensor daemon: {}", e)))?;
        Ok(reply.value)
    }
}

impl BeltSensors for DomeAlertClient {
    fn belt_tensioned(&self, side: Side) -> Result<Option<bool>> {
        match self.sensors.get(side) {
            Some(name) => Ok(Some(self.query(name)?)),
            None => Ok(None),
        }
    }
}
