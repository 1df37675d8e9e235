//! Off-device configuration store client over the router's REST API.

use std::time::Duration;

use async_trait::async_trait;
use lpp_relay_core::{ConfigStore, StoreError};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

/// Credentials and address of a remote device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpEndpoint {
    pub address: String,
    pub username: String,
    pub password: String,
}

impl HttpEndpoint {
    fn url(&self, path: &str) -> String {
        format!(
            "http://{}/api/{}",
            self.address,
            path.trim_start_matches('/')
        )
    }
}

/// Store client that talks to a device over HTTP with basic auth.
#[derive(Debug, Clone)]
pub struct HttpStoreClient {
    endpoint: HttpEndpoint,
    client: Client,
}

impl HttpStoreClient {
    pub fn new(endpoint: HttpEndpoint, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Http(e.to_string()))?;
        Ok(Self { endpoint, client })
    }

    fn map_err(&self, path: &str, err: &reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout {
                path: path.to_string(),
            }
        } else if err.is_connect() {
            StoreError::Unavailable(format!("{}: {err}", self.endpoint.address))
        } else {
            StoreError::Http(err.to_string())
        }
    }
}

#[async_trait]
impl ConfigStore for HttpStoreClient {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let response = self
            .client
            .get(self.endpoint.url(path))
            .basic_auth(&self.endpoint.username, Some(&self.endpoint.password))
            .send()
            .await
            .map_err(|e| self.map_err(path, &e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(%path, %status, "remote get returned non-success status");
            return Ok(None);
        }

        let mut body: Value = response
            .json()
            .await
            .map_err(|e| self.map_err(path, &e))?;
        Ok(body
            .get_mut("data")
            .map(Value::take)
            .filter(|v| !v.is_null()))
    }

    async fn put(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        let data = value.to_string();
        let response = self
            .client
            .put(self.endpoint.url(path))
            .basic_auth(&self.endpoint.username, Some(&self.endpoint.password))
            .form(&[("data", data.as_str())])
            .send()
            .await
            .map_err(|e| self.map_err(path, &e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            path: path.to_string(),
            status: status.to_string(),
            body,
        })
    }

    async fn decrypt(&self, _path: &str) -> Result<Option<Value>, StoreError> {
        Err(StoreError::Unsupported("decrypt over the remote API"))
    }
}
