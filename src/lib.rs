//! cupolad - supervisory daemon for Astrohaven-family clamshell domes
//!
//! The daemon drives the two dome shutters over the controller's single-byte
//! serial protocol, cooperates with the independent hardware heartbeat
//! monitor that force-closes the dome if the host goes quiet, and exposes a
//! TCP command surface to the telescope control stack.

pub mod belt;
pub mod config;
pub mod dome;
pub mod error;
pub mod events;
pub mod server;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use dome::DomeSupervisor;
pub use error::{Error, Result};
pub use server::CommandServer;
pub use types::{CommandOutcome, HeartbeatState, ShutterStatus, Side, StatusSnapshot};
