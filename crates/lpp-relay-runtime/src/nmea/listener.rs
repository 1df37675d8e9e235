//! Accepts downstream TCP subscribers.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::hub::BroadcastHub;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind subscriber listener to {address}: {reason}")]
    Bind { address: String, reason: String },
}

/// TCP listener feeding new connections into a [`BroadcastHub`].
pub struct SubscriberListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    hub: Arc<BroadcastHub>,
    max_subscribers: usize,
}

impl SubscriberListener {
    /// Bind first, so the caller learns about a taken port before any
    /// worker is spawned.
    pub async fn bind(
        address: &str,
        hub: Arc<BroadcastHub>,
        max_subscribers: usize,
    ) -> Result<Self, ListenerError> {
        let bind_err = |e: std::io::Error| ListenerError::Bind {
            address: address.to_string(),
            reason: e.to_string(),
        };
        let listener = TcpListener::bind(address).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        info!(address = %local_addr, max_subscribers, "subscriber listener bound");
        Ok(Self {
            listener,
            local_addr,
            hub,
            max_subscribers,
        })
    }

    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept subscribers until cancelled.
    pub async fn serve(self, cancel_token: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                () = cancel_token.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "failed accepting subscriber");
                    continue;
                }
            };

            if self.hub.len().await >= self.max_subscribers {
                warn!(%peer, limit = self.max_subscribers, "refusing subscriber, limit reached");
                drop(stream);
                continue;
            }

            if let Err(e) = stream.set_nodelay(true) {
                debug!(%peer, error = %e, "could not disable Nagle on subscriber socket");
            }
            self.hub.register(peer.to_string(), stream).await;
        }
        debug!(address = %self.local_addr, "subscriber listener exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lpp_relay_core::Record;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    async fn wait_for_subscribers(hub: &BroadcastHub, n: usize) {
        for _ in 0..100 {
            if hub.len().await == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} subscribers, have {}", hub.len().await);
    }

    #[tokio::test]
    async fn test_accepted_subscriber_receives_broadcast() {
        let hub = Arc::new(BroadcastHub::new(Duration::from_secs(1)));
        let listener = SubscriberListener::bind("127.0.0.1:0", hub.clone(), 5)
            .await
            .unwrap();
        let addr = listener.local_addr();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(listener.serve(cancel.clone()));

        let mut client = TcpStream::connect(addr).await.unwrap();
        wait_for_subscribers(&hub, 1).await;
        hub.broadcast(&Record::now("$GNGGA,1,2,3")).await;

        let mut buf = vec![0u8; 14];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, b"$GNGGA,1,2,3\r\n");

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_connections_over_limit_are_closed() {
        let hub = Arc::new(BroadcastHub::new(Duration::from_secs(1)));
        let listener = SubscriberListener::bind("127.0.0.1:0", hub.clone(), 1)
            .await
            .unwrap();
        let addr = listener.local_addr();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(listener.serve(cancel.clone()));

        let _first = TcpStream::connect(addr).await.unwrap();
        wait_for_subscribers(&hub, 1).await;

        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(2), second.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
        assert_eq!(hub.len().await, 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let hub = Arc::new(BroadcastHub::new(Duration::from_secs(1)));
        let first = SubscriberListener::bind("127.0.0.1:0", hub.clone(), 5)
            .await
            .unwrap();
        let taken = first.local_addr().to_string();
        let err = SubscriberListener::bind(&taken, hub, 5)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ListenerError::Bind { ref address, .. } if *address == taken));
    }
}
