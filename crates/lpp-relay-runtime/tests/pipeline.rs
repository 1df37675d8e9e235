//! Ingestion socket to cache and subscribers, end to end.

use std::sync::Arc;
use std::time::Duration;

use lpp_relay_runtime::{BroadcastHub, IngestServer, NmeaWindow, RecordPipeline, SubscriberListener};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

async fn wait_for_subscribers(hub: &BroadcastHub, n: usize) {
    for _ in 0..200 {
        if hub.len().await == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("subscriber never registered");
}

#[tokio::test]
async fn producer_line_reaches_cache_and_subscriber() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("nmea.sock");
    let cancel = CancellationToken::new();

    let hub = Arc::new(BroadcastHub::new(Duration::from_secs(1)));
    let listener = SubscriberListener::bind("127.0.0.1:0", hub.clone(), 5)
        .await
        .unwrap();
    let fanout_addr = listener.local_addr();
    let listener_task = tokio::spawn(listener.serve(cancel.clone()));

    let (snapshots_tx, mut snapshots) = watch::channel(Vec::new());
    let pipeline = RecordPipeline::new(NmeaWindow::new(Duration::from_secs(30)), hub.clone())
        .with_snapshots(snapshots_tx)
        .with_record_logging(true);
    let server = IngestServer::bind(&socket, Duration::from_secs(5))
        .await
        .unwrap();
    let ingest_task = tokio::spawn(server.serve(pipeline, cancel.clone()));

    let mut subscriber = TcpStream::connect(fanout_addr).await.unwrap();
    wait_for_subscribers(&hub, 1).await;

    let mut producer = UnixStream::connect(&socket).await.unwrap();
    // Split mid-sentence to exercise reassembly.
    producer.write_all(b"GNGGA,1,").await.unwrap();
    producer.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    producer.write_all(b"2,3\r\n").await.unwrap();

    let mut received = vec![0u8; 14];
    tokio::time::timeout(Duration::from_secs(5), subscriber.read_exact(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, b"$GNGGA,1,2,3\r\n");

    snapshots.changed().await.unwrap();
    assert_eq!(*snapshots.borrow(), ["$GNGGA,1,2,3"]);

    cancel.cancel();
    ingest_task.await.unwrap();
    listener_task.await.unwrap();
    assert!(!socket.exists());
}
