//! showfloor - live floor visualization demo runner
//!
//! Connects the configured feed transport to the live tracker and logs the
//! evolving floor state. The production consumer is the experience pages'
//! presentation layer; this binary stands in for it during development.
//!
//! Module structure:
//! - `domain/` - Core data types (Reading, LiveEntry, Zone, geometry)
//! - `io/` - Feed transports, payload normalization, stream client
//! - `services/` - Reconciliation and rendering (tracker, mapper, heatmap)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use showfloor::infra::{Config, FeedTransport, Metrics};
use showfloor::io::{
    stop_channel, MqttFeedConfig, MqttTransport, ReconnectPolicy, StreamConnection,
    TcpJsonTransport,
};
use showfloor::services::LiveFeedService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// showfloor - experience center live data core
#[derive(Parser, Debug)]
#[command(name = "showfloor", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("showfloor starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    let transport_str = match config.feed_transport() {
        FeedTransport::Tcp => "tcp",
        FeedTransport::Mqtt => "mqtt",
    };
    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        transport = %transport_str,
        tcp_addr = %config.feed_tcp_addr(),
        mqtt_host = %config.mqtt_host(),
        mqtt_topic = %config.mqtt_topic(),
        stale_after_ms = %config.stale_after_ms(),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());
    let (stop, shutdown_rx) = stop_channel();

    // Reading batches flow stream -> tracker (bounded for backpressure)
    let (batch_tx, batch_rx) = mpsc::channel(config.queue_size());
    let policy = ReconnectPolicy::new(
        Duration::from_millis(config.backoff_base_ms()),
        Duration::from_millis(config.backoff_cap_ms()),
    );

    // Start the stream client on the configured transport
    let status_rx = match config.feed_transport() {
        FeedTransport::Tcp => {
            let transport = TcpJsonTransport::new(config.feed_tcp_addr());
            let (conn, status_rx) =
                StreamConnection::new(transport, policy, batch_tx, metrics.clone());
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                conn.run(shutdown).await;
            });
            status_rx
        }
        FeedTransport::Mqtt => {
            let transport = MqttTransport::new(MqttFeedConfig::from_config(&config));
            let (conn, status_rx) =
                StreamConnection::new(transport, policy, batch_tx, metrics.clone());
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                conn.run(shutdown).await;
            });
            status_rx
        }
    };

    // Surface connection status transitions ("connection lost, retrying")
    let mut status_watch = status_rx.clone();
    tokio::spawn(async move {
        while status_watch.changed().await.is_ok() {
            let status = *status_watch.borrow();
            info!(status = ?status, "feed_status");
        }
    });

    // Feed service owns the tracker and the marker layer
    let (service, mut snapshot_rx) = LiveFeedService::new(&config, metrics.clone());
    let (_geometry_tx, geometry_rx) = watch::channel(config.floorplan_geometry());
    let service_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        service.run(batch_rx, geometry_rx, service_shutdown).await;
    });
    info!("live_feed_started");

    // Periodic metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.summary().log();
        }
    });

    // Log floor state as it evolves
    tokio::spawn(async move {
        while snapshot_rx.changed().await.is_ok() {
            let (live, markers) = {
                let snapshot = snapshot_rx.borrow();
                (snapshot.live.len(), snapshot.markers.len())
            };
            info!(live_devices = live, markers = markers, "floor_snapshot");
        }
    });

    // Stop everything on Ctrl+C
    tokio::signal::ctrl_c().await.ok();
    info!("shutdown_signal_received");
    stop.stop();

    info!("showfloor shutdown complete");
    Ok(())
}
