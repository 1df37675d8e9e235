//! Reassembles the ingestion byte stream into records.
//!
//! The producer writes CRLF-terminated sentences in arbitrarily sized
//! chunks. A sentence split across two reads is held until its
//! terminator arrives. A multi-byte character split across reads is held
//! the same way, so only genuinely invalid chunks are rejected.

use std::time::Instant;

use lpp_relay_core::Record;
use thiserror::Error;

const TERMINATOR: &str = "\r\n";

/// Longest partial sentence kept while waiting for a terminator.
pub const MAX_PENDING_LEN: usize = 64 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The chunk was not valid UTF-8 and has been dropped.
    #[error("dropped {len}-byte chunk that is not valid UTF-8")]
    InvalidUtf8 { len: usize },

    /// No terminator within [`MAX_PENDING_LEN`]; the partial sentence was discarded.
    #[error("discarded {len} bytes without a line terminator")]
    Overflow { len: usize },
}

/// Stateful CRLF line framer.
#[derive(Debug, Default)]
pub struct LineFramer {
    text: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    partial_char: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes buffered while waiting for more input.
    pub fn pending_len(&self) -> usize {
        self.text.len() + self.partial_char.len()
    }

    /// Feed one chunk and return every record it completes, in order.
    ///
    /// All returned records are stamped with `received_at`.
    pub fn push(&mut self, chunk: &[u8], received_at: Instant) -> Result<Vec<Record>, FrameError> {
        let mut bytes = std::mem::take(&mut self.partial_char);
        bytes.extend_from_slice(chunk);

        match std::str::from_utf8(&bytes) {
            Ok(text) => self.text.push_str(text),
            Err(e) if e.error_len().is_none() => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                // valid_up_to guarantees the prefix decodes
                self.text.push_str(&String::from_utf8_lossy(valid));
                self.partial_char = rest.to_vec();
            }
            Err(_) => return Err(FrameError::InvalidUtf8 { len: chunk.len() }),
        }

        let mut records = Vec::new();
        while let Some(end) = self.text.find(TERMINATOR) {
            let line: String = self.text.drain(..end + TERMINATOR.len()).collect();
            let line = &line[..end];
            if !line.is_empty() {
                records.push(Record::new(normalize(line), received_at));
            }
        }

        if self.text.len() > MAX_PENDING_LEN {
            let len = self.text.len();
            self.text.clear();
            return Err(FrameError::Overflow { len });
        }

        Ok(records)
    }
}

/// Ensure a sentence carries its `$` start delimiter.
pub fn normalize(line: &str) -> String {
    if line.starts_with('$') {
        line.to_string()
    } else {
        format!("${line}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(records: &[Record]) -> Vec<&str> {
        records.iter().map(Record::line).collect()
    }

    #[test]
    fn test_prefix_added_when_missing() {
        let mut framer = LineFramer::new();
        let records = framer.push(b"GNGGA,1,2,3\r\n$GNRMC,4\r\n", Instant::now()).unwrap();
        assert_eq!(lines(&records), ["$GNGGA,1,2,3", "$GNRMC,4"]);
    }

    #[test]
    fn test_partial_line_kept_across_reads() {
        let mut framer = LineFramer::new();
        let now = Instant::now();
        assert!(framer.push(b"$GNGGA,1", now).unwrap().is_empty());
        assert!(framer.push(b",2,3\r", now).unwrap().is_empty());
        let records = framer.push(b"\n$GP", now).unwrap();
        assert_eq!(lines(&records), ["$GNGGA,1,2,3"]);
        assert_eq!(framer.pending_len(), 3);
    }

    #[test]
    fn test_empty_lines_skipped() {
        let mut framer = LineFramer::new();
        let records = framer.push(b"\r\n\r\nA\r\n", Instant::now()).unwrap();
        assert_eq!(lines(&records), ["$A"]);
    }

    #[test]
    fn test_bare_newline_is_not_a_terminator() {
        let mut framer = LineFramer::new();
        let records = framer.push(b"A\nB\r\n", Instant::now()).unwrap();
        assert_eq!(lines(&records), ["$A\nB"]);
    }

    #[test]
    fn test_multibyte_char_split_across_reads() {
        let mut framer = LineFramer::new();
        let now = Instant::now();
        let text = "$TXT,°C\r\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC2).unwrap() + 1;
        assert!(framer.push(&text[..split], now).unwrap().is_empty());
        let records = framer.push(&text[split..], now).unwrap();
        assert_eq!(lines(&records), ["$TXT,°C"]);
    }

    #[test]
    fn test_invalid_chunk_dropped_stream_continues() {
        let mut framer = LineFramer::new();
        let now = Instant::now();
        framer.push(b"$GNGGA,", now).unwrap();
        let err = framer.push(b"\xff\xfe\r\n", now).unwrap_err();
        assert_eq!(err, FrameError::InvalidUtf8 { len: 4 });
        let records = framer.push(b"1\r\n", now).unwrap();
        assert_eq!(lines(&records), ["$GNGGA,1"]);
    }

    #[test]
    fn test_overflow_discards_pending() {
        let mut framer = LineFramer::new();
        let chunk = vec![b'x'; MAX_PENDING_LEN + 1];
        let err = framer.push(&chunk, Instant::now()).unwrap_err();
        assert_eq!(err, FrameError::Overflow { len: MAX_PENDING_LEN + 1 });
        assert_eq!(framer.pending_len(), 0);
    }
}
