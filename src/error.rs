//! Error types for cupolad
//!
//! Serial and I/O errors are transient: the monitor loops close the link,
//! wait five seconds and retry, so none of these abort the process. Command
//! preconditions are not errors at all; they are reported through
//! [`crate::types::CommandOutcome`].

use thiserror::Error;

/// Errors that can occur in cupolad
#[derive(Error, Debug)]
pub enum Error {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serial link is not connected")]
    Disconnected,

    #[error("Read timed out")]
    ReadTimeout,

    #[error("Short write ({0} of 1 bytes)")]
    ShortWrite(usize),

    #[error("Belt sensor error: {0}")]
    BeltSensor(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
