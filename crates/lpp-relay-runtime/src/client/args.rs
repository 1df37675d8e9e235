//! Command lines for the supported correction client releases.

use std::fmt;
use std::path::{Path, PathBuf};

use lpp_relay_core::{CellularIdentity, OutputMode, Parameters, ProtocolFormat};
use tracing::warn;

/// Correction client generation, selected by major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientVersion {
    /// `example-lpp`, releases before 4.0.
    V3,
    /// `example-client`, 4.0 and later.
    V4,
}

impl ClientVersion {
    pub const fn from_major(major: u32) -> Self {
        if major >= 4 { Self::V4 } else { Self::V3 }
    }

    pub const fn binary_name(self) -> &'static str {
        match self {
            Self::V3 => "example-lpp",
            Self::V4 => "example-client",
        }
    }
}

/// Program and argument vector used to spawn the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Builds client command lines from a parameter and identity snapshot.
#[derive(Debug, Clone)]
pub struct ClientCommandBuilder {
    version: ClientVersion,
    client_dir: PathBuf,
    nmea_socket: PathBuf,
}

/// Cell used at launch: explicit starting values win over the live identity.
struct LaunchCell<'a> {
    mcc: &'a str,
    mnc: &'a str,
    tac: &'a str,
    cell_id: &'a str,
}

impl<'a> LaunchCell<'a> {
    fn resolve(params: &'a Parameters, cellular: &'a CellularIdentity) -> Self {
        let starting = &params.starting;
        Self {
            mcc: starting.mcc.as_deref().unwrap_or(&cellular.mcc),
            mnc: starting.mnc.as_deref().unwrap_or(&cellular.mnc),
            tac: starting.tac.as_deref().unwrap_or(&cellular.tac),
            cell_id: starting.cell_id.as_deref().unwrap_or(&cellular.cell_id),
        }
    }
}

fn flag_args(flags: &[String]) -> impl Iterator<Item = String> + '_ {
    flags.iter().map(|flag| format!("--{flag}"))
}

fn identity_args(cellular: &CellularIdentity) -> [String; 2] {
    match &cellular.msisdn {
        Some(msisdn) => ["--msisdn".to_string(), msisdn.clone()],
        None => ["--imsi".to_string(), cellular.imsi.clone()],
    }
}

impl ClientCommandBuilder {
    pub fn new(
        version: ClientVersion,
        client_dir: impl Into<PathBuf>,
        nmea_socket: impl Into<PathBuf>,
    ) -> Self {
        Self {
            version,
            client_dir: client_dir.into(),
            nmea_socket: nmea_socket.into(),
        }
    }

    pub const fn version(&self) -> ClientVersion {
        self.version
    }

    pub fn build(&self, params: &Parameters, cellular: &CellularIdentity) -> LaunchCommand {
        let program = self.client_dir.join(self.version.binary_name());
        let args = match self.version {
            ClientVersion::V3 => self.v3_args(params, cellular),
            ClientVersion::V4 => self.v4_args(params, cellular),
        };
        LaunchCommand::new(program, args)
    }

    fn socket(&self) -> &Path {
        &self.nmea_socket
    }

    fn v3_args(&self, params: &Parameters, cellular: &CellularIdentity) -> Vec<String> {
        let cell = LaunchCell::resolve(params, cellular);
        let mode = if params.format == ProtocolFormat::Osr {
            "osr"
        } else {
            "ssr"
        };

        let mut args = vec![mode.to_string(), "--prm".to_string()];
        args.extend(flag_args(&params.flags));
        args.extend([
            "-h".to_string(),
            params.host.clone(),
            "--port".to_string(),
            params.port.to_string(),
            "-c".to_string(),
            cell.mcc.to_string(),
            "-n".to_string(),
            cell.mnc.to_string(),
            "-t".to_string(),
            cell.tac.to_string(),
            "-i".to_string(),
            cell.cell_id.to_string(),
        ]);
        args.extend(identity_args(cellular));
        args.extend([
            "--nmea-serial".to_string(),
            params.serial.clone(),
            "--nmea-serial-baud".to_string(),
            params.baud.to_string(),
            "--ctrl-stdin".to_string(),
        ]);
        match &params.output {
            OutputMode::Unix { .. } => {
                args.push(format!("--nmea-export-un={}", self.socket().display()));
            }
            OutputMode::TcpServer { host, port } | OutputMode::TcpClient { host, port } => {
                args.push(format!("--nmea-export-tcp={host}"));
                args.push(format!("--nmea-export-tcp-port={port}"));
            }
        }
        args
    }

    fn v4_args(&self, params: &Parameters, cellular: &CellularIdentity) -> Vec<String> {
        let cell = LaunchCell::resolve(params, cellular);

        let none: &[String] = &[];
        let (processor, ad_type, serial_format, extra_flags) = match &params.format {
            ProtocolFormat::Osr | ProtocolFormat::Lpp2Rtcm => ("--lpp2rtcm", "osr", "rtcm", none),
            ProtocolFormat::Lpp2Spartn => (
                "--lpp2spartn",
                "ssr",
                "spartn",
                params.spartn_flags.as_slice(),
            ),
            ProtocolFormat::Tokoro => ("--tokoro", "ssr", "rtcm", params.tokoro_flags.as_slice()),
            ProtocolFormat::OsrLfr => ("--lpp2fr", "osr", "lrf", none),
            ProtocolFormat::SsrLfr => ("--lpp2fr", "ssr", "lrf", none),
            ProtocolFormat::Other(raw) => {
                warn!(format = %raw, "unknown correction format, falling back to osr");
                ("--lpp2rtcm", "osr", "rtcm", none)
            }
        };

        let mut args = vec![processor.to_string()];
        args.extend(flag_args(&params.flags));
        args.extend(flag_args(extra_flags));
        args.extend([
            "--ls-host".to_string(),
            params.host.clone(),
            "--ls-port".to_string(),
            params.port.to_string(),
            "--mcc".to_string(),
            cell.mcc.to_string(),
            "--mnc".to_string(),
            cell.mnc.to_string(),
            "--tac".to_string(),
            cell.tac.to_string(),
            "--ci".to_string(),
            cell.cell_id.to_string(),
        ]);
        if cellular.nr {
            args.push("--nr-cell".to_string());
        }
        args.extend(identity_args(cellular));

        let serial = format!("serial:device={},baudrate={}", params.serial, params.baud);
        let export = match &params.output {
            OutputMode::Unix { .. } => {
                format!("tcp-client:path={},format=nmea", self.socket().display())
            }
            OutputMode::TcpServer { host, port } => {
                format!("tcp-server:host={host},port={port},format=nmea")
            }
            OutputMode::TcpClient { host, port } => {
                format!("tcp-client:host={host},port={port},format=nmea")
            }
        };
        args.extend([
            "--input".to_string(),
            format!("{serial},format=nmea+ubx"),
            "--output".to_string(),
            format!("{serial},format={serial_format}"),
            "--output".to_string(),
            export,
            "--input".to_string(),
            "stdin:format=ctrl".to_string(),
            format!("--ad-type={ad_type}"),
        ]);
        args
    }
}
