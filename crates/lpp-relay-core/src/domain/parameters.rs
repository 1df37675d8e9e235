//! Launch parameters for the correction client.
//!
//! A `Parameters` value is re-derived from the configuration store on
//! every poll tick and compared structurally against the previous one.
//! Any difference means the client has to be relaunched.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Where the correction client exports its NMEA output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OutputMode {
    /// Export to the local ingestion socket, optionally fanned out over TCP.
    Unix {
        /// Port of the subscriber listener (`un-tcp:<port>`).
        fanout_port: Option<u16>,
    },
    /// The client serves NMEA itself on `host:port`.
    TcpServer { host: String, port: u16 },
    /// The client connects out to `host:port`.
    TcpClient { host: String, port: u16 },
}

impl OutputMode {
    /// True when records flow through this relay's ingestion socket.
    pub const fn ingests_locally(&self) -> bool {
        matches!(self, Self::Unix { .. })
    }

    /// Port for downstream TCP subscribers, if fan-out is enabled.
    pub const fn fanout_port(&self) -> Option<u16> {
        match self {
            Self::Unix { fanout_port } => *fanout_port,
            _ => None,
        }
    }
}

impl Default for OutputMode {
    fn default() -> Self {
        Self::Unix { fanout_port: None }
    }
}

fn parse_port(raw: &str) -> Result<u16, String> {
    raw.trim()
        .parse::<u16>()
        .map_err(|e| format!("invalid port {raw:?}: {e}"))
}

fn split_host_port(raw: &str) -> Result<(String, u16), String> {
    let (host, port) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("expected host:port, got {raw:?}"))?;
    if host.is_empty() {
        return Err(format!("missing host in {raw:?}"));
    }
    Ok((host.to_string(), parse_port(port)?))
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix("un-tcp") {
            let port = rest
                .strip_prefix(':')
                .ok_or_else(|| format!("expected un-tcp:<port>, got {s:?}"))?;
            return Ok(Self::Unix {
                fanout_port: Some(parse_port(port)?),
            });
        }
        if s.starts_with("un") {
            return Ok(Self::Unix { fanout_port: None });
        }
        if let Some(rest) = s.strip_prefix("tcp-server:") {
            let (host, port) = split_host_port(rest)?;
            return Ok(Self::TcpServer { host, port });
        }
        if let Some(rest) = s.strip_prefix("tcp-client:") {
            let (host, port) = split_host_port(rest)?;
            return Ok(Self::TcpClient { host, port });
        }
        let (host, port) = split_host_port(s)?;
        Ok(Self::TcpClient { host, port })
    }
}

/// Correction data format requested from the location server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolFormat {
    #[default]
    Osr,
    Lpp2Rtcm,
    Lpp2Spartn,
    Tokoro,
    OsrLfr,
    SsrLfr,
    /// Unrecognised value, kept verbatim so changes are still detected.
    Other(String),
}

impl ProtocolFormat {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Osr => "osr",
            Self::Lpp2Rtcm => "lpp2rtcm",
            Self::Lpp2Spartn => "lpp2spartn",
            Self::Tokoro => "tokoro",
            Self::OsrLfr => "osr-lfr",
            Self::SsrLfr => "ssr-lfr",
            Self::Other(raw) => raw,
        }
    }

    /// True for formats carrying observation-space corrections.
    pub const fn is_osr(&self) -> bool {
        matches!(self, Self::Osr | Self::Lpp2Rtcm | Self::OsrLfr)
    }
}

impl From<&str> for ProtocolFormat {
    fn from(raw: &str) -> Self {
        match raw.trim() {
            "osr" => Self::Osr,
            "lpp2rtcm" => Self::Lpp2Rtcm,
            "lpp2spartn" => Self::Lpp2Spartn,
            "tokoro" => Self::Tokoro,
            "osr-lfr" => Self::OsrLfr,
            "ssr-lfr" => Self::SsrLfr,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ProtocolFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit initial cell, used only for the launch arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StartingCell {
    pub mcc: Option<String>,
    pub mnc: Option<String>,
    pub tac: Option<String>,
    pub cell_id: Option<String>,
}

/// Immutable snapshot of the client's launch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameters {
    /// Location server host.
    pub host: String,
    /// Location server port.
    pub port: u16,
    /// Serial device of the GNSS receiver.
    pub serial: String,
    pub baud: u32,
    pub output: OutputMode,
    pub format: ProtocolFormat,
    pub starting: StartingCell,
    /// Raw forwarding setting; any non-empty value enables forwarding.
    pub forwarding: String,
    pub flags: Vec<String>,
    pub tokoro_flags: Vec<String>,
    pub spartn_flags: Vec<String>,
    /// Store path receiving the record window, `None` when publishing is off.
    pub nmea_store_path: Option<String>,
    pub log_nmea: bool,
}

impl Parameters {
    pub fn forwarding_enabled(&self) -> bool {
        !self.forwarding.is_empty()
    }
}

/// Split a comma/whitespace separated flag list, dropping leading dashes.
pub fn parse_flag_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(|flag| flag.trim_start_matches('-'))
        .filter(|flag| !flag.is_empty())
        .map(str::to_string)
        .collect()
}
