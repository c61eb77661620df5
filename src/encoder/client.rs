use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use super::delivery::DeliverySender;
use super::{SessionState, SessionStatus};
use crate::serial::protocol::{
    classify, rate_command, LineKind, DEFAULT_PUSH_INTERVAL_MS, ENABLE_COMMAND,
};
use crate::serial::{read_line, Connector, Result, Transport};

pub const DEFAULT_INITIAL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Receives every decoded position value, on the worker thread.
pub trait ValueSink: Send + 'static {
    fn deliver(&mut self, value: i64);
}

impl ValueSink for DeliverySender {
    fn deliver(&mut self, value: i64) {
        self.publish(value);
    }
}

impl<F> ValueSink for F
where
    F: FnMut(i64) + Send + 'static,
{
    fn deliver(&mut self, value: i64) {
        self(value)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    /// How long to wait for the first byte of a line
    pub initial_timeout: Duration,
    pub push_interval_ms: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            initial_timeout: DEFAULT_INITIAL_TIMEOUT,
            push_interval_ms: DEFAULT_PUSH_INTERVAL_MS,
        }
    }
}

/// Drives one encoder connection from open to close.
///
/// Runs to completion on the calling thread: open the device, wait for the
/// first `#` status line, enable push mode, then decode data lines until the
/// stop flag is raised or the link fails.
pub struct ProtocolClient<C: Connector, S: ValueSink> {
    connector: C,
    device: String,
    options: ClientOptions,
    sink: S,
    stop: Arc<AtomicBool>,
    status: SessionStatus,
    status_tx: watch::Sender<SessionStatus>,
}

impl<C: Connector, S: ValueSink> ProtocolClient<C, S> {
    pub fn new(connector: C, device: impl Into<String>, sink: S) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::default());
        Self {
            connector,
            device: device.into(),
            options: ClientOptions::default(),
            sink,
            stop: Arc::new(AtomicBool::new(false)),
            status: SessionStatus::default(),
            status_tx,
        }
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Share a stop flag with the owner; raising it ends the receive loop
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Publish status snapshots on `status_tx`
    pub fn with_status(mut self, status_tx: watch::Sender<SessionStatus>) -> Self {
        self.status_tx = status_tx;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Run the session and return its final status
    pub fn run(mut self) -> SessionStatus {
        self.set_state(SessionState::Connecting);

        let mut port = match self.connector.open(&self.device) {
            Ok(port) => port,
            Err(e) => {
                log::error!("Failed to open encoder device {}: {}", self.device, e);
                self.finish(Some(e.to_string()));
                return self.status;
            }
        };

        self.set_state(SessionState::Handshaking);
        let outcome = self.receive_loop(&mut port);
        if let Err(e) = &outcome {
            log::error!("Encoder link on {} failed: {}", self.device, e);
            self.stop.store(true, Ordering::Release);
        }

        self.set_state(SessionState::Stopping);
        port.close();
        self.finish(outcome.err().map(|e| e.to_string()));
        self.status
    }

    fn receive_loop(&mut self, port: &mut C::Port) -> Result<()> {
        while !self.stop.load(Ordering::Acquire) {
            let Some(line) = read_line(port, self.options.initial_timeout)? else {
                continue;
            };
            self.handle_line(port, &line)?;
        }
        log::debug!("Stop requested for encoder on {}", self.device);
        Ok(())
    }

    fn handle_line(&mut self, port: &mut C::Port, line: &str) -> Result<()> {
        match classify(line) {
            LineKind::Comment(text) => {
                log::info!("Encoder: {}", text.trim());
                self.status.comments += 1;
                if self.status.state == SessionState::Handshaking {
                    self.enable_streaming(port)?;
                    self.set_state(SessionState::Streaming);
                    return Ok(());
                }
            }
            LineKind::DeviceError(text) => {
                log::warn!("Encoder reported an error: {}", text.trim());
                self.status.device_errors += 1;
            }
            LineKind::Data(frame) => {
                self.sink.deliver(frame.value);
                self.status.frames_delivered += 1;
                self.status.homed = frame.homed;
            }
            LineKind::Malformed(e) => {
                log::debug!("{}", e);
                self.status.malformed_lines += 1;
            }
        }
        self.publish_status();
        Ok(())
    }

    fn enable_streaming(&mut self, port: &mut C::Port) -> Result<()> {
        port.write(rate_command(self.options.push_interval_ms).as_bytes())?;
        port.write(ENABLE_COMMAND.as_bytes())?;
        log::info!(
            "Enabled push mode every {} ms on {}",
            self.options.push_interval_ms,
            self.device
        );
        Ok(())
    }

    fn set_state(&mut self, state: SessionState) {
        log::debug!("Encoder session {} -> {}", self.status.state.as_str(), state.as_str());
        self.status.state = state;
        self.publish_status();
    }

    fn finish(&mut self, error: Option<String>) {
        self.status.last_error = error;
        self.status.closed_at = Some(Utc::now());
        self.set_state(SessionState::Closed);
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.status.clone());
    }
}
