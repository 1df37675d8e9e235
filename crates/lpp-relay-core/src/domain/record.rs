//! A single positioning sentence as it arrived on the ingestion socket.

use std::fmt;
use std::time::{Duration, Instant};

/// Immutable NMEA record plus its arrival time.
///
/// Records are produced by the line framer with the `$` prefix already
/// applied and without the CRLF terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    line: String,
    received_at: Instant,
}

impl Record {
    /// Create a record stamped with an explicit arrival time.
    pub fn new(line: impl Into<String>, received_at: Instant) -> Self {
        Self {
            line: line.into(),
            received_at,
        }
    }

    /// Create a record stamped with the current instant.
    pub fn now(line: impl Into<String>) -> Self {
        Self::new(line, Instant::now())
    }

    /// The sentence text, without line terminator.
    pub fn line(&self) -> &str {
        &self.line
    }

    pub const fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Age of this record relative to `now`.
    ///
    /// Saturates to zero when `now` precedes the arrival time.
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.received_at)
    }

    /// Wire form sent to TCP subscribers.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.line.len() + 2);
        bytes.extend_from_slice(self.line.as_bytes());
        bytes.extend_from_slice(b"\r\n");
        bytes
    }

    pub fn into_line(self) -> String {
        self.line
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}
