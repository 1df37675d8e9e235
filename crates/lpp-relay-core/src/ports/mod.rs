//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the relay expects from infrastructure.
//! They contain no implementation details and use only domain types.

pub mod config_store;
pub mod device_identity;

pub use config_store::{ConfigStore, StoreError};
pub use device_identity::{ConfigError, DeviceIdentityPort};

#[cfg(test)]
pub use config_store::MockConfigStore;
