//! Command-line interface definition.
//!
//! Every flag can also be set through the environment (a `.env` file in
//! the working directory is loaded first). Launch parameters of the
//! correction client are not flags: they are read from the configuration
//! store's app data on every poll.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use lpp_relay_core::{DEFAULT_NMEA_SOCKET, DEFAULT_STORE_SOCKET, RelaySettings};
use lpp_relay_store::HttpEndpoint;

#[derive(Debug, Parser)]
#[command(name = "lpp-relay")]
#[command(about = "Supervise an LPP correction client and relay its NMEA output")]
#[command(version)]
pub struct Cli {
    /// Local socket the correction client exports NMEA to
    #[arg(long, env = "LPP_RELAY_NMEA_SOCKET", default_value = DEFAULT_NMEA_SOCKET)]
    pub nmea_socket: PathBuf,

    /// On-device configuration store socket
    #[arg(long, env = "LPP_RELAY_STORE_SOCKET", default_value = DEFAULT_STORE_SOCKET)]
    pub store_socket: PathBuf,

    /// Address of a remote device whose store is used over HTTP
    #[arg(long, env = "LPP_RELAY_DEVICE_ADDRESS")]
    pub device_address: Option<String>,

    #[arg(long, env = "LPP_RELAY_DEVICE_USERNAME", default_value = "admin")]
    pub device_username: String,

    #[arg(long, env = "LPP_RELAY_DEVICE_PASSWORD", hide_env_values = true)]
    pub device_password: Option<String>,

    /// Directory holding the correction client binaries
    #[arg(long, env = "LPP_RELAY_CLIENT_DIR", default_value = ".")]
    pub client_dir: PathBuf,

    /// Correction client release; 4.x and later use the v4 command line
    #[arg(long, env = "LPP_VERSION", default_value = "v3.0.0")]
    pub client_version: String,

    /// Seconds between configuration polls
    #[arg(long, value_name = "SECONDS", default_value_t = 10)]
    pub poll_interval: u64,

    /// Seconds a record stays in the published window
    #[arg(long, value_name = "SECONDS", default_value_t = 30)]
    pub retention: u64,

    /// Milliseconds allowed for one subscriber write
    #[arg(long, value_name = "MILLIS", default_value_t = 2000)]
    pub subscriber_write_timeout: u64,

    /// Seconds of producer silence before its connection is dropped
    #[arg(long, value_name = "SECONDS", default_value_t = 60)]
    pub ingest_idle_timeout: u64,

    /// Milliseconds allowed for one configuration store request
    #[arg(long, value_name = "MILLIS", default_value_t = 2000)]
    pub store_timeout: u64,

    /// Maximum concurrent TCP subscribers
    #[arg(long, default_value_t = 5)]
    pub max_subscribers: usize,

    /// Seconds between interrupting and killing the client on shutdown
    #[arg(long, value_name = "SECONDS", default_value_t = 5)]
    pub shutdown_grace: u64,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, env = "LPP_RELAY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Also append logs to this file
    #[arg(long, env = "LPP_RELAY_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn settings(&self) -> RelaySettings {
        RelaySettings {
            nmea_socket: self.nmea_socket.clone(),
            poll_interval: Duration::from_secs(self.poll_interval),
            retention: Duration::from_secs(self.retention),
            subscriber_write_timeout: Duration::from_millis(self.subscriber_write_timeout),
            ingest_idle_timeout: Duration::from_secs(self.ingest_idle_timeout),
            store_timeout: Duration::from_millis(self.store_timeout),
            max_subscribers: self.max_subscribers,
            shutdown_grace: Duration::from_secs(self.shutdown_grace),
            client_dir: self.client_dir.clone(),
            client_version: self.client_version.clone(),
        }
    }

    /// Remote store endpoint, when an address and password are both given.
    pub fn remote_endpoint(&self) -> Option<HttpEndpoint> {
        let address = self.device_address.clone().filter(|a| !a.is_empty())?;
        let password = self.device_password.clone()?;
        Some(HttpEndpoint {
            address,
            username: self.device_username.clone(),
            password,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_match_relay_settings() {
        let cli = Cli::parse_from(["lpp-relay"]);
        let defaults = RelaySettings::default();
        let settings = cli.settings();
        assert_eq!(settings.poll_interval, defaults.poll_interval);
        assert_eq!(settings.retention, defaults.retention);
        assert_eq!(settings.max_subscribers, defaults.max_subscribers);
        assert_eq!(settings.store_timeout, defaults.store_timeout);
    }

    #[test]
    fn test_flags_override_settings() {
        let cli = Cli::parse_from([
            "lpp-relay",
            "--nmea-socket",
            "/run/nmea.sock",
            "--poll-interval",
            "3",
            "--client-version",
            "v4.1.0",
        ]);
        let settings = cli.settings();
        assert_eq!(settings.nmea_socket, PathBuf::from("/run/nmea.sock"));
        assert_eq!(settings.poll_interval, Duration::from_secs(3));
        assert_eq!(settings.client_major_version(), 4);
    }

    #[test]
    fn test_remote_endpoint_needs_password() {
        let cli = Cli::parse_from(["lpp-relay", "--device-address", "192.168.0.1"]);
        assert!(cli.remote_endpoint().is_none());

        let cli = Cli::parse_from([
            "lpp-relay",
            "--device-address",
            "192.168.0.1",
            "--device-password",
            "secret",
        ]);
        let endpoint = cli.remote_endpoint().unwrap();
        assert_eq!(endpoint.address, "192.168.0.1");
        assert_eq!(endpoint.username, "admin");
    }
}
