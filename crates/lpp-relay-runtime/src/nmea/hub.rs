//! Fan-out of records to TCP subscribers.
//!
//! The registry is only locked long enough to copy out the current
//! subscriber list or to add/remove entries, so accepting a subscriber
//! never waits for a broadcast in progress. Writes to all subscribers run
//! concurrently, each bounded by a timeout; a subscriber whose write fails
//! or times out is removed by id once the broadcast has finished.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use lpp_relay_core::Record;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Identifier assigned to a subscriber on registration.
pub type SubscriberId = u64;

type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

struct Subscriber {
    peer: String,
    writer: SharedWriter,
}

/// Registry of live subscribers.
pub struct BroadcastHub {
    subscribers: Mutex<BTreeMap<SubscriberId, Subscriber>>,
    next_id: AtomicU64,
    write_timeout: Duration,
}

impl BroadcastHub {
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            subscribers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            write_timeout,
        }
    }

    /// Add a subscriber. It receives only records broadcast after this call.
    pub async fn register<W>(&self, peer: impl Into<String>, writer: W) -> SubscriberId
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let peer = peer.into();
        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        let mut subscribers = self.subscribers.lock().await;
        subscribers.insert(
            id,
            Subscriber {
                peer: peer.clone(),
                writer: Arc::new(Mutex::new(writer)),
            },
        );
        info!(%peer, id, total = subscribers.len(), "subscriber registered");
        id
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub async fn remove(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscribers.lock().await.is_empty()
    }

    /// Write `<record>\r\n` to every subscriber.
    ///
    /// Returns the number of subscribers that received the record.
    pub async fn broadcast(&self, record: &Record) -> usize {
        let targets: Vec<(SubscriberId, String, SharedWriter)> = {
            let subscribers = self.subscribers.lock().await;
            subscribers
                .iter()
                .map(|(id, s)| (*id, s.peer.clone(), Arc::clone(&s.writer)))
                .collect()
        };
        if targets.is_empty() {
            return 0;
        }

        let payload = record.to_wire();
        let write_timeout = self.write_timeout;
        let results = join_all(targets.into_iter().map(|(id, peer, writer)| {
            let payload = &payload;
            async move {
                let mut writer = writer.lock().await;
                let outcome = match timeout(write_timeout, write_record(&mut **writer, payload)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("write exceeded {write_timeout:?}"),
                    )),
                };
                (id, peer, outcome)
            }
        }))
        .await;

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, peer, outcome) in results {
            match outcome {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(%peer, id, error = %e, "dropping subscriber after failed write");
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.lock().await;
            for id in failed {
                subscribers.remove(&id);
            }
            debug!(remaining = subscribers.len(), "subscriber registry pruned");
        }

        delivered
    }
}

async fn write_record<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(payload).await?;
    writer.flush().await
}
