//! CLI error type and exit code mapping.

use lpp_relay_core::{ConfigError, StoreError};
use lpp_relay_runtime::{IngestError, LAUNCH_FAILED, ListenerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Launch parameters or cellular identity could not be derived.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The configuration store client could not be built.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Subscriber listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map error to an exit code (sysexits.h conventions).
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 78, // EX_CONFIG
            Self::Store(_) => 69,  // EX_UNAVAILABLE
            Self::Ingest(IngestError::InUse { .. }) => 75, // EX_TEMPFAIL
            Self::Ingest(_) | Self::Listener(_) => 71, // EX_OSERR
            Self::Logging(_) => 70, // EX_SOFTWARE
            Self::Io(_) => 74,      // EX_IOERR
        }
    }
}

/// Translate the supervised client's exit status into this process's exit code.
///
/// Normal exits pass through, a client killed by signal `n` maps to
/// `128 + n` like a shell would report it, and a launch failure maps to
/// `EX_OSERR`.
pub const fn child_exit_code(code: i32) -> i32 {
    match code {
        LAUNCH_FAILED => 71,
        c if c >= 0 => c,
        c => 128 - c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_child_exit_codes() {
        assert_eq!(child_exit_code(0), 0);
        assert_eq!(child_exit_code(3), 3);
        assert_eq!(child_exit_code(-1), 129);
        assert_eq!(child_exit_code(-2), 130);
        assert_eq!(child_exit_code(-9), 137);
        assert_eq!(child_exit_code(LAUNCH_FAILED), 71);
    }

    #[test]
    fn test_error_exit_codes() {
        let in_use = CliError::from(IngestError::InUse {
            path: PathBuf::from("/tmp/nmea.sock"),
        });
        assert_eq!(in_use.exit_code(), 75);

        let config = CliError::from(ConfigError::malformed(
            "lpp-client.port",
            "abc",
            "invalid digit",
        ));
        assert_eq!(config.exit_code(), 78);
    }
}
