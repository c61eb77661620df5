pub mod client;
pub mod delivery;
pub mod session;

pub use client::{ClientOptions, ProtocolClient, ValueSink};
pub use delivery::{Delivery, DeliveryReceiver, DeliverySender};
pub use session::EncoderSession;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle of one encoder session. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Handshaking,
    Streaming,
    Stopping,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Handshaking => "handshaking",
            SessionState::Streaming => "streaming",
            SessionState::Stopping => "stopping",
            SessionState::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

/// Snapshot of what the worker has been doing, published on every change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub frames_delivered: u64,
    pub malformed_lines: u64,
    pub device_errors: u64,
    pub comments: u64,
    /// Homed flag of the most recent frame
    pub homed: bool,
    /// Set when the session ended because of a fatal error
    pub last_error: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to spawn encoder worker: {0}")]
    Spawn(#[from] std::io::Error),
}
