//! Wire format of the on-device configuration store socket.
//!
//! Requests are newline separated text. Responses carry a header block
//! terminated by a blank line, then a JSON body:
//!
//! ```text
//! status: ok\r\n
//! content-length: 12\r\n
//! \r\n
//! {"nmea": []}
//! ```

use lpp_relay_core::StoreError;
use serde_json::Value;

pub const END_OF_HEADER: &[u8] = b"\r\n\r\n";

/// Largest single read from the store socket.
pub const MAX_PACKET_SIZE: usize = 8192;

/// Upper bound for the header block.
pub const MAX_HEADER_SIZE: usize = 64 * 1024;

/// Upper bound for a response body.
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Parsed store response.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreResponse {
    pub status: String,
    pub body: Value,
}

impl StoreResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Header fields of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    pub status: String,
    pub content_length: usize,
}

pub fn get_request(path: &str) -> String {
    format!("get\n{path}\n\n0\n")
}

pub fn decrypt_request(path: &str) -> String {
    format!("decrypt\n{path}\n\n0\n")
}

pub fn put_request(path: &str, value: &Value) -> String {
    format!("put\n{path}\n\n0\n{value}\n")
}

/// Offset of the blank line ending the header block, if present.
pub fn find_end_of_header(data: &[u8]) -> Option<usize> {
    data.windows(END_OF_HEADER.len())
        .position(|w| w == END_OF_HEADER)
}

fn header_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
    })
}

/// Parse the header block (everything before the blank line).
pub fn parse_header(header: &[u8]) -> Result<ResponseHeader, StoreError> {
    let header = std::str::from_utf8(header)
        .map_err(|e| StoreError::Protocol(format!("header is not UTF-8: {e}")))?;
    let status = header_value(header, "status")
        .ok_or_else(|| StoreError::Protocol("missing status header".to_string()))?
        .to_string();
    let length = header_value(header, "content-length")
        .ok_or_else(|| StoreError::Protocol("missing content-length header".to_string()))?;
    let content_length: usize = length
        .parse()
        .map_err(|e| StoreError::Protocol(format!("bad content-length {length:?}: {e}")))?;
    if content_length > MAX_BODY_SIZE {
        return Err(StoreError::Protocol(format!(
            "content-length {content_length} exceeds {MAX_BODY_SIZE} bytes"
        )));
    }
    Ok(ResponseHeader {
        status,
        content_length,
    })
}

/// Decode a response body.
///
/// The store answers some requests (notably failed puts) with a plain text
/// message instead of JSON; that text is returned as a JSON string.
pub fn decode_body(body: &[u8]) -> Value {
    let text = String::from_utf8_lossy(body);
    serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.trim().to_string()))
}
