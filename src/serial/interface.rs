use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};

use super::{Result, SerialError, SerialPortInfo};

pub const BAUD_RATE: u32 = 115200;
/// Budget for a whole outbound command to leave the port.
pub const WRITE_BUDGET: Duration = Duration::from_millis(500);
const DRAIN_POLL: Duration = Duration::from_millis(1);

/// Byte-level access to an open connection.
///
/// Implementations block for at most the given timeout and never interpret
/// the bytes they move.
pub trait Transport: Send {
    /// Read a single byte, waiting at most `timeout`.
    fn read_byte(&mut self, timeout: Duration) -> Result<u8>;

    /// Write all of `bytes` within [`WRITE_BUDGET`].
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Release the connection. Calling it again is a no-op.
    fn close(&mut self);
}

/// Opens transports for the protocol client.
pub trait Connector: Send + 'static {
    type Port: Transport + 'static;

    fn open(&mut self, device: &str) -> Result<Self::Port>;
}

/// Serial connection with the fixed line settings used by the decoder
/// firmware: 115200 8N1 with hardware flow control.
pub struct SerialInterface {
    port: Option<Box<dyn SerialPort>>,
    port_name: String,
    timeout: Option<Duration>,
}

impl SerialInterface {
    /// List the serial ports currently visible to the OS
    pub fn discover_ports() -> Result<Vec<SerialPortInfo>> {
        let ports = serialport::available_ports().map_err(std::io::Error::from)?;

        let devices = ports
            .into_iter()
            .map(|port| match port.port_type {
                SerialPortType::UsbPort(usb_info) => SerialPortInfo {
                    port_name: port.port_name,
                    vid: Some(usb_info.vid),
                    pid: Some(usb_info.pid),
                    serial_number: usb_info.serial_number,
                    manufacturer: usb_info.manufacturer,
                    product: usb_info.product,
                },
                _ => SerialPortInfo {
                    port_name: port.port_name,
                    vid: None,
                    pid: None,
                    serial_number: None,
                    manufacturer: None,
                    product: None,
                },
            })
            .collect();

        Ok(devices)
    }

    /// Open and configure the given device
    pub fn open(port_name: &str) -> Result<Self> {
        let mut port = serialport::new(port_name, BAUD_RATE)
            .timeout(WRITE_BUDGET)
            .open()
            .map_err(|e| match e.kind {
                serialport::ErrorKind::NoDevice
                | serialport::ErrorKind::Io(ErrorKind::NotFound) => {
                    SerialError::DeviceNotFound(port_name.to_string())
                }
                _ => SerialError::ConfigurationFailed(format!("{}: {}", port_name, e)),
            })?;

        // On failure `port` is dropped here, which closes the descriptor.
        configure(&mut *port)
            .map_err(|e| SerialError::ConfigurationFailed(format!("{}: {}", port_name, e)))?;

        log::info!("Opened {} at {} baud", port_name, BAUD_RATE);
        let mut interface = Self::from_port(port, port_name);
        interface.timeout = Some(WRITE_BUDGET);
        Ok(interface)
    }

    /// Wrap an already opened port without touching its line settings.
    pub(crate) fn from_port(port: Box<dyn SerialPort>, port_name: &str) -> Self {
        Self {
            port: Some(port),
            port_name: port_name.to_string(),
            timeout: None,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

fn configure(port: &mut dyn SerialPort) -> serialport::Result<()> {
    port.set_baud_rate(BAUD_RATE)?;
    port.set_data_bits(DataBits::Eight)?;
    port.set_stop_bits(StopBits::One)?;
    port.set_parity(Parity::None)?;
    port.set_flow_control(FlowControl::Hardware)?;
    Ok(())
}

fn apply_timeout(
    port: &mut dyn SerialPort,
    current: &mut Option<Duration>,
    timeout: Duration,
) -> Result<()> {
    if *current != Some(timeout) {
        port.set_timeout(timeout).map_err(std::io::Error::from)?;
        *current = Some(timeout);
    }
    Ok(())
}

impl Transport for SerialInterface {
    fn read_byte(&mut self, timeout: Duration) -> Result<u8> {
        let port = self.port.as_mut().ok_or(SerialError::NotConnected)?;
        apply_timeout(&mut **port, &mut self.timeout, timeout)?;

        let mut byte = [0u8; 1];
        loop {
            match port.read(&mut byte) {
                Ok(1) => return Ok(byte[0]),
                Ok(_) => return Err(SerialError::Timeout),
                Err(e) if e.kind() == ErrorKind::TimedOut => return Err(SerialError::Timeout),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(SerialError::IoFailure(e)),
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(SerialError::NotConnected)?;

        let expected = bytes.len();
        let deadline = Instant::now() + WRITE_BUDGET;
        let mut written = 0;

        while written < expected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SerialError::WriteTimeout { written, expected });
            }
            apply_timeout(&mut **port, &mut self.timeout, remaining)?;
            match port.write(&bytes[written..]) {
                Ok(0) => return Err(SerialError::WriteTimeout { written, expected }),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    return Err(SerialError::WriteTimeout { written, expected })
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(SerialError::IoFailure(e)),
            }
        }

        // `flush` is an unbounded tcdrain on POSIX; poll the output queue instead.
        loop {
            let pending = port.bytes_to_write().map_err(std::io::Error::from)? as usize;
            if pending == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                let written = expected.saturating_sub(pending);
                return Err(SerialError::WriteTimeout { written, expected });
            }
            thread::sleep(DRAIN_POLL);
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            log::info!("Closed {}", self.port_name);
        }
    }
}

impl Drop for SerialInterface {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connector for real serial devices.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    type Port = SerialInterface;

    fn open(&mut self, device: &str) -> Result<SerialInterface> {
        SerialInterface::open(device)
    }
}
