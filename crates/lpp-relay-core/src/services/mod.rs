//! Services built on top of the ports.

mod device_settings;

pub use device_settings::{APPDATA_PATH, DeviceSettings, EnvLookup, appdata_env_key};
