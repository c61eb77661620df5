pub mod serial;
pub mod encoder;
pub mod config;
pub mod logger;

pub use config::EncoderConfig;
pub use encoder::{Delivery, DeliveryReceiver, EncoderSession, SessionState, SessionStatus};
pub use serial::{Frame, SerialConnector};
