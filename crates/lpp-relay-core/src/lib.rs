//! Core domain types and port definitions for the LPP correction relay.
//!
//! This crate holds everything the relay reasons about without touching
//! sockets or processes: launch parameters, cellular identity snapshots,
//! the hot-patch command vocabulary, the configuration-store port and the
//! service that derives snapshots from it.

#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod ports;
pub mod services;
pub mod settings;

pub use domain::{
    CellularIdentity, HotPatchCommand, OutputMode, Parameters, ProtocolFormat, Radio, Record,
};
pub use ports::{ConfigError, ConfigStore, DeviceIdentityPort, StoreError};
pub use services::{APPDATA_PATH, DeviceSettings, appdata_env_key};
pub use settings::{
    DEFAULT_NMEA_SOCKET, DEFAULT_NMEA_STORE_PATH, DEFAULT_STORE_SOCKET, RelaySettings,
};
