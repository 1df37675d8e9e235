//! Port supplying the snapshots compared by the reconfiguration loop.

use async_trait::async_trait;
use thiserror::Error;

use super::config_store::StoreError;
use crate::domain::{CellularIdentity, Parameters};

/// Errors deriving a snapshot from the configuration store.
///
/// Always recoverable: a failed poll tick is logged and skipped.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The underlying store request failed.
    #[error("reading {path} failed: {source}")]
    Store {
        path: String,
        #[source]
        source: StoreError,
    },

    /// A value had the wrong shape or could not be parsed.
    #[error("malformed value {value:?} for {key}: {reason}")]
    Malformed {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn store(path: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::Malformed {
            key: key.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

/// Source of launch parameters and cellular identity.
#[async_trait]
pub trait DeviceIdentityPort: Send + Sync {
    /// Re-derive the client's launch parameters.
    async fn parameters(&self) -> Result<Parameters, ConfigError>;

    /// Re-derive the serving cell identity.
    async fn cellular(&self) -> Result<CellularIdentity, ConfigError>;
}
