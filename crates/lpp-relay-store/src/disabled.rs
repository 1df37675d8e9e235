use async_trait::async_trait;
use lpp_relay_core::{ConfigStore, StoreError};
use serde_json::Value;

/// Store used when neither the local socket nor a remote device is
/// reachable. Every call fails with [`StoreError::Disabled`].
#[derive(Debug, Clone)]
pub struct DisabledStore {
    reason: String,
}

impl DisabledStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[async_trait]
impl ConfigStore for DisabledStore {
    async fn get(&self, _path: &str) -> Result<Option<Value>, StoreError> {
        Err(StoreError::Disabled(self.reason.clone()))
    }

    async fn put(&self, _path: &str, _value: &Value) -> Result<(), StoreError> {
        Err(StoreError::Disabled(self.reason.clone()))
    }

    async fn decrypt(&self, _path: &str) -> Result<Option<Value>, StoreError> {
        Err(StoreError::Disabled(self.reason.clone()))
    }
}
