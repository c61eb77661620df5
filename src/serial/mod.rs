pub mod interface;
pub mod line;
pub mod protocol;
pub mod scripted;

pub use interface::{Connector, SerialConnector, SerialInterface, Transport};
pub use line::read_line;
pub use protocol::{Frame, FrameError, LineKind};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("Read timeout")]
    Timeout,

    #[error("Write timeout: {written} of {expected} bytes sent")]
    WriteTimeout { written: usize, expected: usize },

    #[error("IO failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("Connection is closed")]
    NotConnected,
}

impl SerialError {
    /// Only an idle read is recoverable; everything else ends the session.
    pub fn is_transient(&self) -> bool {
        matches!(self, SerialError::Timeout)
    }
}

pub type Result<T> = std::result::Result<T, SerialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_read_timeout_is_transient() {
        assert!(SerialError::Timeout.is_transient());
        assert!(!SerialError::WriteTimeout { written: 0, expected: 5 }.is_transient());
        assert!(!SerialError::NotConnected.is_transient());
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged");
        assert!(!SerialError::from(io).is_transient());
    }

    #[test]
    fn write_timeout_reports_progress() {
        let err = SerialError::WriteTimeout { written: 2, expected: 5 };
        assert_eq!(err.to_string(), "Write timeout: 2 of 5 bytes sent");
    }
}
