//! Pushes the record window to the configuration store.
//!
//! The ingestion path never waits on the store. It replaces the latest
//! snapshot in a watch channel and this task puts whatever is newest;
//! snapshots superseded while a put is in flight are skipped.

use std::sync::Arc;

use lpp_relay_core::ConfigStore;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct StorePublisher {
    store: Arc<dyn ConfigStore>,
    path: String,
}

impl StorePublisher {
    pub fn new(store: Arc<dyn ConfigStore>, path: impl Into<String>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Put one snapshot. Failures are logged and otherwise ignored.
    pub async fn publish(&self, snapshot: &[String]) -> bool {
        let value = Value::from(snapshot.to_vec());
        match self.store.put(&self.path, &value).await {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.path, error = %e, "failed publishing record window");
                false
            }
        }
    }

    /// Publish every snapshot change until cancelled or the sender is gone.
    pub fn spawn(
        self,
        mut snapshots: watch::Receiver<Vec<String>>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => break,
                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = snapshots.borrow_and_update().clone();
                        self.publish(&snapshot).await;
                    }
                }
            }
            debug!(path = %self.path, "store publisher exiting");
        })
    }
}
