use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default push interval requested from the decoder firmware
pub const DEFAULT_PUSH_INTERVAL_MS: u32 = 100;
/// Switches the firmware into push mode
pub const ENABLE_COMMAND: &str = "1\n";

/// One decoded telemetry line: `<channel> <value> <homed>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub channel: u32,
    pub value: i64,
    pub homed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Malformed frame {line:?}: {reason}")]
    Malformed { line: String, reason: &'static str },
}

/// What a received line means to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// `#<text>`: status chatter; the first one after open means "ready"
    Comment(String),
    /// `?<text>`: the firmware complains about something
    DeviceError(String),
    Data(Frame),
    Malformed(FrameError),
}

/// Classify a line (already stripped of its terminator) by its first byte.
pub fn classify(line: &str) -> LineKind {
    if let Some(text) = line.strip_prefix('#') {
        return LineKind::Comment(text.to_string());
    }
    if let Some(text) = line.strip_prefix('?') {
        return LineKind::DeviceError(text.to_string());
    }
    match line.parse::<Frame>() {
        Ok(frame) => LineKind::Data(frame),
        Err(e) => LineKind::Malformed(e),
    }
}

/// Build the `S<ms>` push interval command
pub fn rate_command(interval_ms: u32) -> String {
    format!("S{}\n", interval_ms)
}

impl FromStr for Frame {
    type Err = FrameError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = |reason| FrameError::Malformed { line: line.to_string(), reason };

        match line.trim_start().chars().next() {
            Some(c) if c.is_ascii_digit() || c == '-' => {}
            Some(_) => return Err(malformed("does not start with a number")),
            None => return Err(malformed("empty line")),
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(malformed("expected three fields"));
        }

        let channel = parts[0]
            .parse::<i64>()
            .ok()
            .and_then(|channel| u32::try_from(channel).ok())
            .ok_or_else(|| malformed("invalid channel"))?;
        let value = parts[1].parse::<i64>().map_err(|_| malformed("invalid value"))?;
        let homed = parts[2].parse::<i64>().map_err(|_| malformed("invalid homed flag"))?;

        Ok(Frame { channel, value, homed: homed != 0 })
    }
}

impl fmt::Display for Frame {
    /// Canonical wire form, without the terminator
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.channel, self.value, u8::from(self.homed))
    }
}
