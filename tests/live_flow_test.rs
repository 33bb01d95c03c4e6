//! End-to-end flow: TCP feed -> stream client -> tracker snapshot
//!
//! Stands in for a page session: a fake backend pushes NDJSON batches, the
//! stream client normalizes them, and the feed service folds them into the
//! published floor state.

use showfloor::domain::types::{epoch_ms, DeviceId, ReadingValue};
use showfloor::infra::{Config, Metrics};
use showfloor::io::{stop_channel, ReconnectPolicy, StreamConnection, TcpJsonTransport};
use showfloor::services::LiveFeedService;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

#[tokio::test]
async fn test_readings_flow_from_socket_to_snapshot() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let t0 = epoch_ms();

    // Fake backend: one client, two batches, the second one stale for A
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let batch1 = format!(
            "[{{\"tin\": \"A\", \"value\": 10, \"timestamp\": {t0}}}, \
             {{\"tin\": \"B\", \"value\": 5, \"timestamp\": {t0}}}]\n"
        );
        socket.write_all(batch1.as_bytes()).await.unwrap();
        let batch2 = format!("[{{\"tin\": \"A\", \"value\": 12, \"timestamp\": {}}}]\n", t0 - 10);
        socket.write_all(batch2.as_bytes()).await.unwrap();
        // Keep the connection open while the test observes state
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let config = Config::default();
    let metrics = Arc::new(Metrics::new());
    let (stop, shutdown_rx) = stop_channel();

    let (batch_tx, batch_rx) = mpsc::channel(64);
    let (conn, _status_rx) = StreamConnection::new(
        TcpJsonTransport::new(addr.to_string()),
        ReconnectPolicy::default(),
        batch_tx,
        metrics.clone(),
    );
    let conn_handle = tokio::spawn(conn.run(shutdown_rx.clone()));

    let (service, mut snapshot_rx) = LiveFeedService::new(&config, metrics.clone());
    let (_geometry_tx, geometry_rx) = watch::channel(None);
    let service_handle = tokio::spawn(service.run(batch_rx, geometry_rx, shutdown_rx));

    // First batch lands in the published snapshot
    timeout(Duration::from_secs(5), async {
        loop {
            snapshot_rx.changed().await.unwrap();
            if snapshot_rx.borrow().live.len() == 2 {
                break;
            }
        }
    })
    .await
    .expect("snapshot never showed both devices");

    // The stale batch is processed (visible in metrics) but changes nothing
    timeout(Duration::from_secs(5), async {
        while metrics.summary().readings_rejected < 1 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("stale reading never counted as rejected");

    {
        let snapshot = snapshot_rx.borrow();
        let a = snapshot.live.get(&DeviceId::new("A")).unwrap();
        let b = snapshot.live.get(&DeviceId::new("B")).unwrap();
        assert_eq!(a.value, ReadingValue::Number(10.0));
        assert_eq!(a.observed_at, t0);
        assert_eq!(b.value, ReadingValue::Number(5.0));
    }
    assert_eq!(metrics.summary().readings_accepted, 2);
    assert_eq!(metrics.summary().payloads_received, 2);

    stop.stop();
    conn_handle.await.unwrap();
    service_handle.await.unwrap();
}
