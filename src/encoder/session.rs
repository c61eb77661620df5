use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::Utc;
use tokio::sync::watch;

use super::client::{ClientOptions, ProtocolClient};
use super::delivery::{self, DeliveryReceiver};
use super::{SessionError, SessionState, SessionStatus};
use crate::config::EncoderConfig;
use crate::serial::Connector;

const WORKER_NAME: &str = "ardecoder-serial";

/// A running encoder client on its own worker thread.
///
/// Owns the stop flag, the worker's join handle and the status channel.
/// Dropping the session stops it and waits for the link to be closed.
pub struct EncoderSession {
    device: String,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<SessionStatus>>,
    status_rx: watch::Receiver<SessionStatus>,
    final_status: Option<SessionStatus>,
}

impl EncoderSession {
    /// Spawn the worker for `config.device`. Decoded values show up on the
    /// returned receiver.
    pub fn start<C: Connector>(
        connector: C,
        config: &EncoderConfig,
    ) -> Result<(Self, DeliveryReceiver), SessionError> {
        let (sender, receiver) = delivery::slot();
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let stop = Arc::new(AtomicBool::new(false));

        let client = ProtocolClient::new(connector, config.device.clone(), sender)
            .with_options(ClientOptions {
                initial_timeout: config.initial_timeout(),
                push_interval_ms: config.push_interval_ms,
            })
            .with_stop_flag(stop.clone())
            .with_status(status_tx);

        let worker = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || client.run())?;

        log::info!("Encoder session started on {}", config.device);
        let session = Self {
            device: config.device.clone(),
            stop,
            worker: Some(worker),
            status_rx,
            final_status: None,
        };
        Ok((session, receiver))
    }

    /// Ask the worker to stop without waiting for it
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Stop the worker and wait until the link is closed
    pub fn stop(&mut self) -> SessionStatus {
        self.request_stop();
        self.wait()
    }

    /// Wait for the worker to end on its own (link failure or an earlier
    /// stop request)
    pub fn join(mut self) -> SessionStatus {
        self.wait()
    }

    fn wait(&mut self) -> SessionStatus {
        if let Some(worker) = self.worker.take() {
            let status = worker.join().unwrap_or_else(|_| {
                log::error!("Encoder worker for {} panicked", self.device);
                SessionStatus {
                    state: SessionState::Closed,
                    last_error: Some("encoder worker panicked".to_string()),
                    closed_at: Some(Utc::now()),
                    ..self.status()
                }
            });
            log::info!("Encoder session on {} closed", self.device);
            self.final_status = Some(status);
        }
        self.final_status.clone().unwrap_or_else(|| self.status())
    }

    /// Latest status published by the worker
    pub fn status(&self) -> SessionStatus {
        self.status_rx.borrow().clone()
    }

    /// Subscribe to status changes, e.g. to notice the session closing
    pub fn status_receiver(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().map_or(false, |w| !w.is_finished())
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::scripted::{OpenFailure, ScriptedConnector, Step};
    use std::time::Duration;

    fn config() -> EncoderConfig {
        EncoderConfig { initial_timeout_ms: 5, ..EncoderConfig::new("/dev/ttyUSB0") }
    }

    #[test]
    fn drop_stops_and_closes() {
        let (connector, handle) = ScriptedConnector::new(vec![Step::line("#ready")]);
        let (session, _values) = EncoderSession::start(connector, &config()).unwrap();
        let mut status_rx = session.status_receiver();
        while status_rx.borrow_and_update().state != SessionState::Streaming {
            std::thread::sleep(Duration::from_millis(1));
        }
        drop(session);
        assert_eq!(handle.close_count(), 1);
    }

    #[test]
    fn join_returns_after_open_failure() {
        let (connector, handle) = ScriptedConnector::failing(OpenFailure::Misconfigured);
        let (session, mut values) = EncoderSession::start(connector, &config()).unwrap();
        let status = session.join();
        assert_eq!(status.state, SessionState::Closed);
        assert!(status.last_error.unwrap().contains("configuration"));
        assert_eq!(handle.close_count(), 0);
        assert!(values.try_take().is_none());
    }

    #[test]
    fn stop_is_repeatable() {
        let (connector, handle) = ScriptedConnector::new(vec![]);
        let (mut session, _values) = EncoderSession::start(connector, &config()).unwrap();
        let first = session.stop();
        let second = session.stop();
        assert_eq!(first.state, SessionState::Closed);
        assert_eq!(second.state, SessionState::Closed);
        assert!(!session.is_running());
        assert_eq!(handle.close_count(), 1);
    }
}
