//! Relay settings.
//!
//! These are the knobs of the relay itself (sockets, timeouts, poll
//! cadence), as opposed to the correction client's launch parameters which
//! are read from the configuration store on every poll.

use std::path::PathBuf;
use std::time::Duration;

/// Local socket the correction client exports NMEA to.
pub const DEFAULT_NMEA_SOCKET: &str = "/tmp/nmea.sock";

/// Store path receiving the recent record window.
pub const DEFAULT_NMEA_STORE_PATH: &str = "/status/rtk/nmea";

/// On-device configuration store socket.
pub const DEFAULT_STORE_SOCKET: &str = "/var/tmp/cs.sock";

/// Runtime settings for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// Path of the local ingestion socket.
    pub nmea_socket: PathBuf,
    /// Interval between reconfiguration polls.
    pub poll_interval: Duration,
    /// How long records stay in the published window.
    pub retention: Duration,
    /// Upper bound for a single subscriber write.
    pub subscriber_write_timeout: Duration,
    /// Producer connections idle longer than this are dropped.
    pub ingest_idle_timeout: Duration,
    /// Upper bound for a single configuration store request.
    pub store_timeout: Duration,
    /// Maximum concurrently registered TCP subscribers.
    pub max_subscribers: usize,
    /// Grace period between interrupt and kill on shutdown.
    pub shutdown_grace: Duration,
    /// Directory holding the correction client binaries.
    pub client_dir: PathBuf,
    /// Client release string, e.g. `v4.0.2`.
    pub client_version: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            nmea_socket: PathBuf::from(DEFAULT_NMEA_SOCKET),
            poll_interval: Duration::from_secs(10),
            retention: Duration::from_secs(30),
            subscriber_write_timeout: Duration::from_secs(2),
            ingest_idle_timeout: Duration::from_secs(60),
            store_timeout: Duration::from_secs(2),
            max_subscribers: 5,
            shutdown_grace: Duration::from_secs(5),
            client_dir: PathBuf::from("."),
            client_version: "v3.0.0".to_string(),
        }
    }
}

impl RelaySettings {
    /// Major version parsed from `client_version`, defaulting to 3.
    pub fn client_major_version(&self) -> u32 {
        self.client_version
            .trim()
            .trim_start_matches('v')
            .split('.')
            .next()
            .and_then(|major| major.parse().ok())
            .unwrap_or(3)
    }
}
