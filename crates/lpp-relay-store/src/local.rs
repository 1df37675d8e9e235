//! On-device configuration store client.
//!
//! Every request opens a fresh Unix stream connection to the store socket,
//! writes one request and reads one framed response. A request that does
//! not complete within the configured timeout is abandoned.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use lpp_relay_core::{ConfigStore, StoreError};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

use crate::frame::{
    self, END_OF_HEADER, MAX_HEADER_SIZE, MAX_PACKET_SIZE, StoreResponse, find_end_of_header,
    parse_header,
};

/// Client for the store's local socket protocol.
#[derive(Debug, Clone)]
pub struct LocalStoreClient {
    socket: PathBuf,
    timeout: Duration,
}

impl LocalStoreClient {
    pub fn new(socket: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket: socket.into(),
            timeout,
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    async fn dispatch(&self, path: &str, request: String) -> Result<StoreResponse, StoreError> {
        let exchange = async {
            let mut stream = UnixStream::connect(&self.socket).await.map_err(|e| {
                StoreError::Unavailable(format!("{}: {e}", self.socket.display()))
            })?;
            stream.write_all(request.as_bytes()).await?;
            read_response(&mut stream).await
        };

        timeout(self.timeout, exchange)
            .await
            .map_err(|_| StoreError::Timeout {
                path: path.to_string(),
            })?
    }
}

/// Read one framed response from `reader`.
pub async fn read_response<R>(reader: &mut R) -> Result<StoreResponse, StoreError>
where
    R: AsyncRead + Unpin,
{
    let mut data = Vec::with_capacity(MAX_PACKET_SIZE);
    let mut chunk = vec![0u8; MAX_PACKET_SIZE];

    let eoh = loop {
        if let Some(eoh) = find_end_of_header(&data) {
            break eoh;
        }
        if data.len() > MAX_HEADER_SIZE {
            return Err(StoreError::Protocol(format!(
                "header exceeds {MAX_HEADER_SIZE} bytes"
            )));
        }
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(StoreError::Protocol(
                "connection closed before end of header".to_string(),
            ));
        }
        data.extend_from_slice(&chunk[..n]);
    };

    let header = parse_header(&data[..eoh])?;
    let body_start = eoh + END_OF_HEADER.len();

    while data.len() - body_start < header.content_length {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            debug!(
                expected = header.content_length,
                received = data.len() - body_start,
                "store closed connection before full body"
            );
            break;
        }
        data.extend_from_slice(&chunk[..n]);
    }

    let body_end = data
        .len()
        .min(body_start.saturating_add(header.content_length));
    Ok(StoreResponse {
        status: header.status,
        body: frame::decode_body(&data[body_start..body_end]),
    })
}

#[async_trait]
impl ConfigStore for LocalStoreClient {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let response = self.dispatch(path, frame::get_request(path)).await?;
        if !response.is_ok() {
            debug!(%path, status = %response.status, body = %response.body, "get returned non-ok status");
            return Ok(None);
        }
        Ok(Some(response.body).filter(|v| !v.is_null()))
    }

    async fn put(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        let response = self.dispatch(path, frame::put_request(path, value)).await?;
        if response.is_ok() {
            Ok(())
        } else {
            Err(StoreError::Status {
                path: path.to_string(),
                status: response.status,
                body: response.body.to_string(),
            })
        }
    }

    async fn decrypt(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let response = self.dispatch(path, frame::decrypt_request(path)).await?;
        if !response.is_ok() {
            return Err(StoreError::Status {
                path: path.to_string(),
                status: response.status,
                body: response.body.to_string(),
            });
        }
        Ok(Some(response.body).filter(|v| !v.is_null()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::UnixListener;

    fn framed(status: &str, body: &str) -> Vec<u8> {
        format!(
            "status: {status}\r\ncontent-length: {}\r\n\r\n{body}",
            body.len()
        )
        .into_bytes()
    }

    /// Serve one connection: capture the first request line, answer with `reply`.
    async fn serve_once(listener: UnixListener, reply: Vec<u8>) -> String {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = tokio::io::BufReader::new(read_half).lines();
        let verb = lines.next_line().await.unwrap().unwrap();
        let path = lines.next_line().await.unwrap().unwrap();
        // Replies are split so the client has to reassemble them.
        let (head, tail) = reply.split_at(reply.len() / 2);
        write_half.write_all(head).await.unwrap();
        write_half.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        write_half.write_all(tail).await.unwrap();
        format!("{verb} {path}")
    }

    #[tokio::test]
    async fn test_get_returns_body() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("cs.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let server = tokio::spawn(serve_once(
            listener,
            framed("ok", r#"{"nmea": ["$GNGGA"]}"#),
        ));

        let client = LocalStoreClient::new(&socket, Duration::from_secs(2));
        let value = client.get("/status/rtk").await.unwrap();

        assert_eq!(value, Some(json!({"nmea": ["$GNGGA"]})));
        assert_eq!(server.await.unwrap(), "get /status/rtk");
    }

    #[tokio::test]
    async fn test_put_rejected_status() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("cs.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let server = tokio::spawn(serve_once(listener, framed("error", "read only")));

        let client = LocalStoreClient::new(&socket, Duration::from_secs(2));
        let err = client
            .put("/status/rtk/nmea", &json!([]))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Status { ref status, .. } if status == "error"));
        assert_eq!(server.await.unwrap(), "put /status/rtk/nmea");
    }

    #[tokio::test]
    async fn test_huge_content_length_is_protocol_error() {
        let mut reply: &[u8] = b"status: ok\r\ncontent-length: 18446744073709551615\r\n\r\n{}";
        let err = read_response(&mut reply).await.unwrap_err();
        assert!(matches!(err, StoreError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_missing_socket_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let client = LocalStoreClient::new(dir.path().join("absent.sock"), Duration::from_secs(1));
        let err = client.get("/status").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_silent_store_times_out() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("cs.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let client = LocalStoreClient::new(&socket, Duration::from_millis(100));
        let err = client.get("/status").await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout { .. }));
    }
}
