//! feedsim - synthetic NDJSON reading feed for development
//!
//! Serves newline-delimited JSON reading batches over TCP so the demo
//! runner has a live data source without real hardware. Simulates a set of
//! sensors plus positioning tags, with jittered values, mixed field
//! spellings, and occasional late (out-of-order) deliveries to exercise the
//! monotonicity filter downstream.

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// feedsim - synthetic experience-center reading feed
#[derive(Parser, Debug, Clone)]
#[command(name = "feedsim", version, about)]
struct Args {
    /// Listen address for the NDJSON feed
    #[arg(short, long, default_value = "127.0.0.1:7070")]
    listen: String,
    /// Number of simulated sensors
    #[arg(short = 'n', long, default_value_t = 6)]
    sensors: usize,
    /// Number of simulated positioning tags
    #[arg(short, long, default_value_t = 3)]
    tags: usize,
    /// Batch interval in milliseconds
    #[arg(short, long, default_value_t = 500)]
    interval_ms: u64,
    /// Physical space width in centimeters (tag positions)
    #[arg(long, default_value_t = 1000.0)]
    space_w_cm: f64,
    /// Physical space height in centimeters (tag positions)
    #[arg(long, default_value_t = 600.0)]
    space_h_cm: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();
    let listener = TcpListener::bind(&args.listen).await?;
    info!(
        addr = %args.listen,
        sensors = args.sensors,
        tags = args.tags,
        interval_ms = args.interval_ms,
        "feedsim listening"
    );

    loop {
        let (socket, peer) = listener.accept().await?;
        info!(peer = %peer, "client_connected");
        let client_args = args.clone();
        tokio::spawn(async move {
            serve_client(socket, client_args).await;
        });
    }
}

/// Push batches to one client until it goes away
async fn serve_client(mut socket: TcpStream, args: Args) {
    let mut interval = tokio::time::interval(Duration::from_millis(args.interval_ms.max(10)));
    let mut rng = StdRng::from_entropy();

    loop {
        interval.tick().await;
        let batch = build_batch(&mut rng, &args);
        let mut line = match serde_json::to_string(&batch) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "batch_serialize_failed");
                continue;
            }
        };
        line.push('\n');
        if socket.write_all(line.as_bytes()).await.is_err() {
            info!("client_disconnected");
            return;
        }
    }
}

/// One batch of sensor readings plus tag positions
fn build_batch(rng: &mut StdRng, args: &Args) -> Vec<serde_json::Value> {
    let now = OffsetDateTime::now_utc();
    let now_ms = (now.unix_timestamp_nanos() / 1_000_000) as u64;
    let mut batch = Vec::with_capacity(args.sensors + args.tags);

    for i in 0..args.sensors {
        // ~5% of readings arrive late with an older capture time
        let captured = if rng.gen_bool(0.05) { now - time::Duration::seconds(5) } else { now };
        let timestamp = captured.format(&Rfc3339).unwrap_or_default();
        let value = 20.0 + i as f64 + rng.gen_range(-0.5..0.5);
        batch.push(json!({
            "tin": format!("TIN-{:03}", i + 1),
            "value": (value * 10.0).round() / 10.0,
            "unit": "C",
            "timestamp": timestamp,
        }));
    }

    for i in 0..args.tags {
        let x = rng.gen_range(0.0..args.space_w_cm);
        // Center-origin vertical coordinate, the positioning vendor's frame
        let y = rng.gen_range(-args.space_h_cm / 2.0..args.space_h_cm / 2.0);
        let id = format!("TAG-{:02}", i + 1);
        // Rotate field spellings to exercise the shape-tolerant parser
        let object = match i % 3 {
            0 => json!({"asset_id": id, "x": x, "y": y, "timestamp": now_ms}),
            1 => json!({"assetId": id, "img_x": x, "img_y": y, "timestamp": now_ms}),
            _ => json!({"id": id, "x_px": x, "y_px": y, "timestamp": now_ms}),
        };
        batch.push(object);
    }

    batch
}
