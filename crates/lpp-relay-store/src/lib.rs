//! Configuration store adapters.
//!
//! Implements [`lpp_relay_core::ConfigStore`] for the on-device store socket,
//! the remote REST API, and a disabled fallback used when neither is
//! available.

#![deny(unused_crate_dependencies)]

mod disabled;
pub mod frame;
mod http;
mod local;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use lpp_relay_core::{ConfigStore, StoreError};
use tracing::{info, warn};

pub use disabled::DisabledStore;
pub use http::{HttpEndpoint, HttpStoreClient};
pub use local::{LocalStoreClient, read_response};

/// Which store backend to talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Local(PathBuf),
    Http(HttpEndpoint),
    Disabled(String),
}

impl StoreTarget {
    /// Pick a backend: an explicit remote endpoint wins, then the local
    /// socket if it exists, otherwise the store is disabled.
    pub fn detect(socket: impl Into<PathBuf>, remote: Option<HttpEndpoint>) -> Self {
        if let Some(endpoint) = remote {
            return Self::Http(endpoint);
        }
        let socket = socket.into();
        if socket.exists() {
            Self::Local(socket)
        } else {
            Self::Disabled(format!("store socket {} not found", socket.display()))
        }
    }

    /// Build the client for this target.
    pub fn connect(self, timeout: Duration) -> Result<Arc<dyn ConfigStore>, StoreError> {
        match self {
            Self::Local(socket) => {
                info!(socket = %socket.display(), "using local configuration store");
                Ok(Arc::new(LocalStoreClient::new(socket, timeout)))
            }
            Self::Http(endpoint) => {
                info!(address = %endpoint.address, "using remote configuration store");
                Ok(Arc::new(HttpStoreClient::new(endpoint, timeout)?))
            }
            Self::Disabled(reason) => {
                warn!(%reason, "configuration store disabled, using defaults");
                Ok(Arc::new(DisabledStore::new(reason)))
            }
        }
    }
}
