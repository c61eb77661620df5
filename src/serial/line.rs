//! Line assembly on top of a byte transport.
//!
//! The first byte of a line may take as long as the caller allows (the device
//! is idle between frames); once bytes are flowing, each following byte must
//! arrive within [`INTER_BYTE_TIMEOUT`].

use std::time::Duration;

use super::{Result, SerialError, Transport};

pub const INTER_BYTE_TIMEOUT: Duration = Duration::from_millis(100);

/// Read one `\n`-terminated line, stripping a trailing `\r`.
///
/// Returns `Ok(None)` when nothing arrived within `initial_timeout`, or when
/// the line stalled halfway; the partial bytes are discarded in that case.
/// Any other transport error is returned as is.
pub fn read_line<T: Transport + ?Sized>(
    port: &mut T,
    initial_timeout: Duration,
) -> Result<Option<String>> {
    let mut buffer = Vec::new();
    let mut timeout = initial_timeout;

    loop {
        match port.read_byte(timeout) {
            Ok(b'\n') => break,
            Ok(byte) => buffer.push(byte),
            Err(SerialError::Timeout) if buffer.is_empty() => return Ok(None),
            Err(SerialError::Timeout) => {
                log::debug!(
                    "Dropping {} bytes of a stalled line: {:?}",
                    buffer.len(),
                    String::from_utf8_lossy(&buffer)
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        timeout = INTER_BYTE_TIMEOUT;
    }

    if buffer.last() == Some(&b'\r') {
        buffer.pop();
    }

    Ok(Some(String::from_utf8_lossy(&buffer).into_owned()))
}
