//! Configuration store port.
//!
//! The device's configuration store is a hierarchical tree of settings and
//! status values. The relay only needs get/put/decrypt on JSON values;
//! transport details live in `lpp-relay-store`.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors from configuration store requests.
///
/// All of these are transient from the relay's point of view: callers log
/// them and abandon the operation without retrying.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No store is configured for this host (running off-device).
    #[error("configuration store disabled: {0}")]
    Disabled(String),

    /// The store could not be reached.
    #[error("configuration store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer in time.
    #[error("request for {path} timed out")]
    Timeout { path: String },

    /// The response could not be framed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The store answered with a non-success status.
    #[error("store rejected {path} with status {status}: {body}")]
    Status {
        path: String,
        status: String,
        body: String,
    },

    /// HTTP transport error (off-device access).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Operation not available with this client.
    #[error("{0} is not supported by this store client")]
    Unsupported(&'static str),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Socket IO failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Port for reading and writing the device configuration store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read the value at `path`; `Ok(None)` when the path holds no data.
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the value at `path`.
    async fn put(&self, path: &str, value: &Value) -> Result<(), StoreError>;

    /// Read and decrypt a protected value at `path`.
    async fn decrypt(&self, path: &str) -> Result<Option<Value>, StoreError>;
}
