//! Local ingestion socket.
//!
//! The correction client connects here and streams NMEA. One producer is
//! served at a time; when it disconnects the server goes back to
//! accepting. Every record flows through a [`RecordPipeline`] which feeds
//! the window cache, the store publisher and the broadcast hub in arrival
//! order.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lpp_relay_core::Record;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::NmeaWindow;
use super::framer::LineFramer;
use super::hub::BroadcastHub;

const READ_CHUNK: usize = 8192;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Another live process is serving the socket.
    #[error("ingestion socket {} is held by a running process", path.display())]
    InUse { path: PathBuf },

    #[error("failed to bind ingestion socket {}: {source}", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Where each framed record goes.
pub struct RecordPipeline {
    window: NmeaWindow,
    snapshots: Option<watch::Sender<Vec<String>>>,
    hub: Arc<BroadcastHub>,
    log_records: bool,
}

impl RecordPipeline {
    pub fn new(window: NmeaWindow, hub: Arc<BroadcastHub>) -> Self {
        Self {
            window,
            snapshots: None,
            hub,
            log_records: false,
        }
    }

    /// Publish the window snapshot on `sender` after every insert.
    #[must_use]
    pub fn with_snapshots(mut self, sender: watch::Sender<Vec<String>>) -> Self {
        self.snapshots = Some(sender);
        self
    }

    #[must_use]
    pub const fn with_record_logging(mut self, enabled: bool) -> Self {
        self.log_records = enabled;
        self
    }

    pub const fn window(&self) -> &NmeaWindow {
        &self.window
    }

    pub async fn handle(&mut self, record: Record) {
        if self.log_records {
            info!(target: "nmea", "{record}");
        }
        self.hub.broadcast(&record).await;
        self.window.insert(record);
        if let Some(sender) = &self.snapshots {
            sender.send_replace(self.window.snapshot());
        }
    }
}

/// Removes the socket file when dropped.
struct SocketFile(PathBuf);

impl Drop for SocketFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => debug!(path = %self.0.display(), "removed ingestion socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.0.display(), error = %e, "failed removing ingestion socket"),
        }
    }
}

pub struct IngestServer {
    listener: UnixListener,
    socket: SocketFile,
    idle_timeout: Duration,
}

impl IngestServer {
    /// Bind the ingestion socket, clearing a stale file left by a previous run.
    ///
    /// A socket file that still accepts connections belongs to a live
    /// instance and is left alone.
    pub async fn bind(path: impl AsRef<Path>, idle_timeout: Duration) -> Result<Self, IngestError> {
        let path = path.as_ref();
        if path.exists() {
            if UnixStream::connect(path).await.is_ok() {
                return Err(IngestError::InUse {
                    path: path.to_path_buf(),
                });
            }
            info!(path = %path.display(), "removing stale ingestion socket");
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(IngestError::Bind {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }
        }

        let listener = UnixListener::bind(path).map_err(|source| IngestError::Bind {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "ingestion socket bound");

        Ok(Self {
            listener,
            socket: SocketFile(path.to_path_buf()),
            idle_timeout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.socket.0
    }

    /// Serve producers one at a time until cancelled.
    pub async fn serve(self, mut pipeline: RecordPipeline, cancel_token: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                () = cancel_token.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, _)) => {
                    info!(path = %self.path().display(), "producer connected");
                    self.serve_producer(stream, &mut pipeline, &cancel_token).await;
                }
                Err(e) => warn!(error = %e, "failed accepting producer"),
            }
        }
        debug!(path = %self.path().display(), "ingestion server exiting");
    }

    async fn serve_producer(
        &self,
        mut stream: UnixStream,
        pipeline: &mut RecordPipeline,
        cancel_token: &CancellationToken,
    ) {
        let mut framer = LineFramer::new();
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            let read = tokio::select! {
                () = cancel_token.cancelled() => return,
                read = timeout(self.idle_timeout, stream.read(&mut buf)) => read,
            };

            let n = match read {
                Ok(Ok(0)) => {
                    info!("producer disconnected");
                    return;
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    warn!(error = %e, "producer read failed");
                    return;
                }
                Err(_) => {
                    warn!(idle = ?self.idle_timeout, "producer idle, dropping connection");
                    return;
                }
            };

            match framer.push(&buf[..n], std::time::Instant::now()) {
                Ok(records) => {
                    for record in records {
                        pipeline.handle(record).await;
                    }
                }
                Err(e) => warn!(error = %e, "discarding ingested bytes"),
            }
        }
    }
}
