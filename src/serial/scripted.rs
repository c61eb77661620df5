//! In-memory transport that replays a script of device behaviour.
//!
//! Exposed unconditionally so integration tests and harnesses can drive the
//! protocol client without hardware. A [`ScriptHandle`] stays with the test
//! and records what the client did to the link.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{Connector, Result, SerialError, Transport};

/// One scripted device behaviour, consumed by reads in order.
#[derive(Debug, Clone)]
pub enum Step {
    /// Bytes handed out one per read
    Bytes(VecDeque<u8>),
    /// A single read that times out immediately
    Silence,
    /// A single read that fails hard
    Fail(ErrorKind),
    /// Sleep before serving the next step
    Pause(Duration),
}

impl Step {
    pub fn text(text: &str) -> Self {
        Step::Bytes(text.bytes().collect())
    }

    /// `text` followed by `\n`
    pub fn line(text: &str) -> Self {
        Step::Bytes(text.bytes().chain(std::iter::once(b'\n')).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFailure {
    Timeout,
    Io(ErrorKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailure {
    NotFound,
    Misconfigured,
}

#[derive(Debug, Default)]
struct ScriptState {
    steps: VecDeque<Step>,
    reads: usize,
    read_timeouts: Vec<Duration>,
    writes: Vec<Vec<u8>>,
    write_failure: Option<(usize, WriteFailure)>,
    closes: usize,
    opens: usize,
}

/// Test-side view of a scripted link.
#[derive(Debug, Clone, Default)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptHandle {
    fn new(steps: Vec<Step>) -> Self {
        let state = ScriptState { steps: steps.into(), ..Default::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append more device behaviour while the client is running
    pub fn push(&self, step: Step) {
        self.lock().steps.push_back(step);
    }

    /// Make the `nth` write (0-based) and every later one fail
    pub fn fail_writes_from(&self, nth: usize, failure: WriteFailure) {
        self.lock().write_failure = Some((nth, failure));
    }

    /// Number of `read_byte` calls made so far
    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    pub fn read_timeouts(&self) -> Vec<Duration> {
        self.lock().read_timeouts.clone()
    }

    /// Successfully written payloads, in order
    pub fn writes(&self) -> Vec<String> {
        self.lock()
            .writes
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    pub fn open_count(&self) -> usize {
        self.lock().opens
    }

    /// True once every scripted step has been consumed
    pub fn is_drained(&self) -> bool {
        self.lock().steps.is_empty()
    }
}

pub struct ScriptedTransport {
    handle: ScriptHandle,
    write_attempts: usize,
    closed: bool,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> (Self, ScriptHandle) {
        let handle = ScriptHandle::new(steps);
        (Self::attach(handle.clone()), handle)
    }

    fn attach(handle: ScriptHandle) -> Self {
        Self { handle, write_attempts: 0, closed: false }
    }
}

impl Transport for ScriptedTransport {
    fn read_byte(&mut self, timeout: Duration) -> Result<u8> {
        if self.closed {
            return Err(SerialError::NotConnected);
        }
        {
            let mut state = self.handle.lock();
            state.reads += 1;
            state.read_timeouts.push(timeout);
        }

        loop {
            let mut state = self.handle.lock();
            let pause = match state.steps.front_mut() {
                Some(Step::Bytes(bytes)) => match bytes.pop_front() {
                    Some(byte) => {
                        if bytes.is_empty() {
                            state.steps.pop_front();
                        }
                        return Ok(byte);
                    }
                    None => {
                        state.steps.pop_front();
                        continue;
                    }
                },
                Some(Step::Silence) => {
                    state.steps.pop_front();
                    return Err(SerialError::Timeout);
                }
                Some(Step::Fail(kind)) => {
                    let kind = *kind;
                    state.steps.pop_front();
                    return Err(SerialError::IoFailure(std::io::Error::new(
                        kind,
                        "scripted read failure",
                    )));
                }
                Some(Step::Pause(duration)) => {
                    let duration = *duration;
                    state.steps.pop_front();
                    Some(duration)
                }
                None => None,
            };
            drop(state);

            match pause {
                Some(duration) => std::thread::sleep(duration),
                // script exhausted: behave like an idle line
                None => {
                    std::thread::sleep(timeout);
                    return Err(SerialError::Timeout);
                }
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.closed {
            return Err(SerialError::NotConnected);
        }
        let attempt = self.write_attempts;
        self.write_attempts += 1;

        let mut state = self.handle.lock();
        match state.write_failure {
            Some((nth, WriteFailure::Timeout)) if attempt >= nth => {
                Err(SerialError::WriteTimeout { written: 0, expected: bytes.len() })
            }
            Some((nth, WriteFailure::Io(kind))) if attempt >= nth => Err(SerialError::IoFailure(
                std::io::Error::new(kind, "scripted write failure"),
            )),
            _ => {
                state.writes.push(bytes.to_vec());
                Ok(())
            }
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.handle.lock().closes += 1;
    }
}

/// Connector handing out a single scripted transport.
pub struct ScriptedConnector {
    handle: ScriptHandle,
    open_failure: Option<OpenFailure>,
}

impl ScriptedConnector {
    pub fn new(steps: Vec<Step>) -> (Self, ScriptHandle) {
        let handle = ScriptHandle::new(steps);
        (Self { handle: handle.clone(), open_failure: None }, handle)
    }

    pub fn failing(failure: OpenFailure) -> (Self, ScriptHandle) {
        let handle = ScriptHandle::default();
        (Self { handle: handle.clone(), open_failure: Some(failure) }, handle)
    }
}

impl Connector for ScriptedConnector {
    type Port = ScriptedTransport;

    fn open(&mut self, device: &str) -> Result<ScriptedTransport> {
        self.handle.lock().opens += 1;
        match self.open_failure {
            Some(OpenFailure::NotFound) => Err(SerialError::DeviceNotFound(device.to_string())),
            Some(OpenFailure::Misconfigured) => Err(SerialError::ConfigurationFailed(format!(
                "{}: scripted configuration failure",
                device
            ))),
            None => Ok(ScriptedTransport::attach(self.handle.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_bytes_then_times_out() {
        let (mut port, handle) = ScriptedTransport::new(vec![Step::text("ab"), Step::Silence]);
        let t = Duration::from_millis(1);
        assert_eq!(port.read_byte(t).unwrap(), b'a');
        assert_eq!(port.read_byte(t).unwrap(), b'b');
        assert!(matches!(port.read_byte(t), Err(SerialError::Timeout)));
        assert!(matches!(port.read_byte(t), Err(SerialError::Timeout)));
        assert_eq!(handle.reads(), 4);
        assert!(handle.is_drained());
    }

    #[test]
    fn closed_transport_refuses_io() {
        let (mut port, handle) = ScriptedTransport::new(vec![Step::text("a")]);
        port.close();
        assert!(matches!(port.read_byte(Duration::ZERO), Err(SerialError::NotConnected)));
        assert!(matches!(port.write(b"x"), Err(SerialError::NotConnected)));
        assert_eq!(handle.close_count(), 1);
        assert_eq!(handle.reads(), 0);
    }

    #[test]
    fn write_failures_start_at_requested_attempt() {
        let (mut port, handle) = ScriptedTransport::new(vec![]);
        handle.fail_writes_from(1, WriteFailure::Timeout);
        port.write(b"S100\n").unwrap();
        assert!(matches!(port.write(b"1\n"), Err(SerialError::WriteTimeout { .. })));
        assert_eq!(handle.writes(), vec!["S100\n".to_string()]);
    }
}
