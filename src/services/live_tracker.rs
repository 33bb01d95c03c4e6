//! Live reading reconciliation with staleness eviction
//!
//! The tracker folds a stream of asynchronous, possibly out-of-order
//! readings into the "currently live" subset of devices:
//! - Per-device monotonicity: a reading not newer than the stored entry is
//!   dropped; other devices in the same batch are unaffected
//! - Bounded history: at most N numeric values per device, arrival order
//! - Staleness eviction: entries older than the threshold are removed on a
//!   periodic sweep, so detection lags by at most one sweep period

use crate::domain::geometry::{DisplayPosition, ImageGeometry};
use crate::domain::types::{epoch_ms, DeviceId, LiveEntry, Reading, DEFAULT_HISTORY_LEN};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::coord_mapper::CoordinateMapper;
use crate::services::marker_layer::MarkerLayer;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

/// Default staleness threshold (ms) before a silent device is evicted
pub const DEFAULT_STALE_AFTER_MS: u64 = 12_000;

/// Outcome of one ingest batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: usize,
    pub rejected: usize,
}

/// Maintains the live subset of devices from a reading stream
pub struct LiveReadingTracker {
    entries: FxHashMap<DeviceId, LiveEntry>,
    stale_after_ms: u64,
    history_len: usize,
}

impl LiveReadingTracker {
    pub fn new(stale_after_ms: u64) -> Self {
        Self { entries: FxHashMap::default(), stale_after_ms, history_len: DEFAULT_HISTORY_LEN }
    }

    pub fn with_history_len(mut self, history_len: usize) -> Self {
        self.history_len = history_len.max(1);
        self
    }

    /// Fold one reading into the live state
    ///
    /// Returns false when the reading is not newer than the stored entry for
    /// its device (equal timestamps count as not-newer, so redelivery is a
    /// no-op). Create-or-update otherwise.
    pub fn accept(&mut self, reading: &Reading) -> bool {
        match self.entries.get_mut(&reading.device_id) {
            Some(entry) => {
                if entry.observed_at >= reading.observed_at {
                    debug!(
                        device_id = %reading.device_id,
                        stored_at = entry.observed_at,
                        observed_at = reading.observed_at,
                        "reading_stale_dropped"
                    );
                    return false;
                }
                entry.value = reading.value.clone();
                entry.unit = reading.unit.clone();
                entry.observed_at = reading.observed_at;
                if let Some(n) = reading.value.as_number() {
                    entry.history.push(n);
                    if entry.history.len() > self.history_len {
                        let excess = entry.history.len() - self.history_len;
                        entry.history.drain(..excess);
                    }
                }
                true
            }
            None => {
                self.entries.insert(reading.device_id.clone(), LiveEntry::from_reading(reading));
                true
            }
        }
    }

    /// Fold a batch of readings, in array order
    ///
    /// A rejected reading only skips its own device's update; the rest of
    /// the batch is still processed.
    pub fn ingest(&mut self, readings: &[Reading]) -> IngestStats {
        let mut stats = IngestStats::default();
        for reading in readings {
            if self.accept(reading) {
                stats.accepted += 1;
            } else {
                stats.rejected += 1;
            }
        }
        stats
    }

    /// Evict entries whose reading age exceeds the staleness threshold
    ///
    /// Returns the devices removed, reported upstream as "disconnected".
    pub fn sweep(&mut self, now_ms: u64) -> Vec<DeviceId> {
        let stale_after = self.stale_after_ms;
        let mut evicted = Vec::new();
        self.entries.retain(|device_id, entry| {
            let age = now_ms.saturating_sub(entry.observed_at);
            if age > stale_after {
                evicted.push(device_id.clone());
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Owned copy of the current live state
    ///
    /// The copy is unaffected by subsequent ingest/sweep calls, so a
    /// consumer can iterate it while the tracker keeps moving.
    pub fn snapshot(&self) -> FxHashMap<DeviceId, LiveEntry> {
        self.entries.clone()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn stale_after_ms(&self) -> u64 {
        self.stale_after_ms
    }
}

/// Published view of the floor: live entries plus mapped marker positions
#[derive(Debug, Clone, Default)]
pub struct FloorSnapshot {
    /// Epoch ms at publish time
    pub taken_at: u64,
    pub live: FxHashMap<DeviceId, LiveEntry>,
    pub markers: FxHashMap<DeviceId, DisplayPosition>,
}

/// Event loop around the tracker: consumes reading batches, ticks the sweep,
/// folds position readings into the marker layer, and publishes snapshots
pub struct LiveFeedService {
    tracker: LiveReadingTracker,
    markers: MarkerLayer,
    metrics: Arc<Metrics>,
    sweep_interval: Duration,
    snapshot_tx: watch::Sender<FloorSnapshot>,
}

impl LiveFeedService {
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> (Self, watch::Receiver<FloorSnapshot>) {
        let tracker = LiveReadingTracker::new(config.stale_after_ms())
            .with_history_len(config.history_len());
        let mut markers = MarkerLayer::new();
        if let Some(geometry) = config.floorplan_geometry() {
            markers.set_geometry(CoordinateMapper::new(geometry));
        }
        let (snapshot_tx, snapshot_rx) = watch::channel(FloorSnapshot::default());
        let service = Self {
            tracker,
            markers,
            metrics,
            sweep_interval: Duration::from_millis(config.sweep_interval_ms().max(1)),
            snapshot_tx,
        };
        (service, snapshot_rx)
    }

    /// Run until the batch channel closes or shutdown is signalled
    ///
    /// `geometry_rx` carries late-arriving display geometry from the layout
    /// collaborator; buffered marker positions are applied when it lands.
    pub async fn run(
        mut self,
        mut batch_rx: mpsc::Receiver<Vec<Reading>>,
        mut geometry_rx: watch::Receiver<Option<ImageGeometry>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut sweep = interval(self.sweep_interval);
        let mut geometry_open = true;

        loop {
            tokio::select! {
                batch = batch_rx.recv() => {
                    match batch {
                        Some(readings) => self.apply_batch(&readings),
                        None => break, // Channel closed
                    }
                }
                _ = sweep.tick() => {
                    self.sweep_now(epoch_ms());
                }
                res = geometry_rx.changed(), if geometry_open => {
                    match res {
                        Ok(()) => {
                            let geometry = *geometry_rx.borrow();
                            if let Some(geometry) = geometry {
                                self.apply_geometry(geometry);
                            }
                        }
                        Err(_) => geometry_open = false,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("live_feed_shutdown");
                        break;
                    }
                }
            }
        }
    }

    fn apply_batch(&mut self, readings: &[Reading]) {
        let mut accepted = 0usize;
        let mut rejected = 0usize;
        for reading in readings {
            if self.tracker.accept(reading) {
                accepted += 1;
                if let Some(raw) = reading.value.as_position() {
                    self.markers.update(&reading.device_id, raw);
                }
            } else {
                rejected += 1;
            }
        }
        self.metrics.record_readings(accepted as u64, rejected as u64);
        if accepted > 0 {
            self.publish();
        }
    }

    fn sweep_now(&mut self, now_ms: u64) {
        let evicted = self.tracker.sweep(now_ms);
        if evicted.is_empty() {
            return;
        }
        for device_id in &evicted {
            self.markers.remove(device_id);
            warn!(device_id = %device_id, "device_disconnected");
        }
        self.metrics.record_evictions(evicted.len() as u64);
        self.publish();
    }

    fn apply_geometry(&mut self, geometry: ImageGeometry) {
        let applied = self.markers.set_geometry(CoordinateMapper::new(geometry));
        info!(backlog_applied = applied, "floor_geometry_set");
        self.publish();
    }

    fn publish(&self) {
        let snapshot = FloorSnapshot {
            taken_at: epoch_ms(),
            live: self.tracker.snapshot(),
            markers: self.markers.snapshot(),
        };
        self.snapshot_tx.send_replace(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::RawPosition;
    use crate::domain::types::ReadingValue;

    fn tracker() -> LiveReadingTracker {
        LiveReadingTracker::new(DEFAULT_STALE_AFTER_MS)
    }

    #[test]
    fn test_first_reading_creates_entry() {
        let mut t = tracker();
        let stats = t.ingest(&[Reading::numeric("A", 10.0, 100)]);
        assert_eq!(stats, IngestStats { accepted: 1, rejected: 0 });

        let snap = t.snapshot();
        let entry = snap.get(&DeviceId::new("A")).unwrap();
        assert_eq!(entry.value, ReadingValue::Number(10.0));
        assert_eq!(entry.observed_at, 100);
        assert_eq!(entry.history.as_slice(), &[10.0]);
    }

    #[test]
    fn test_older_reading_leaves_entry_unchanged() {
        let mut t = tracker();
        t.ingest(&[Reading::numeric("A", 10.0, 100)]);
        let stats = t.ingest(&[Reading::numeric("A", 12.0, 90)]);
        assert_eq!(stats, IngestStats { accepted: 0, rejected: 1 });

        let snap = t.snapshot();
        let entry = snap.get(&DeviceId::new("A")).unwrap();
        assert_eq!(entry.value, ReadingValue::Number(10.0));
        assert_eq!(entry.observed_at, 100);
    }

    #[test]
    fn test_equal_timestamp_redelivery_is_noop() {
        let mut t = tracker();
        let reading = Reading::numeric("A", 10.0, 100);
        t.ingest(&[reading.clone()]);
        t.ingest(&[reading]);

        let snap = t.snapshot();
        let entry = snap.get(&DeviceId::new("A")).unwrap();
        // No duplicate history entry from the redelivery
        assert_eq!(entry.history.as_slice(), &[10.0]);
    }

    #[test]
    fn test_rejection_does_not_affect_rest_of_batch() {
        let mut t = tracker();
        t.ingest(&[Reading::numeric("A", 10.0, 100), Reading::numeric("B", 5.0, 100)]);
        // A's update is older and rejected; B's goes through
        let stats = t.ingest(&[Reading::numeric("A", 12.0, 90), Reading::numeric("B", 6.0, 110)]);
        assert_eq!(stats, IngestStats { accepted: 1, rejected: 1 });

        let snap = t.snapshot();
        assert_eq!(snap.get(&DeviceId::new("A")).unwrap().value, ReadingValue::Number(10.0));
        assert_eq!(snap.get(&DeviceId::new("B")).unwrap().value, ReadingValue::Number(6.0));
    }

    #[test]
    fn test_history_bounded_to_last_n() {
        let mut t = LiveReadingTracker::new(DEFAULT_STALE_AFTER_MS).with_history_len(30);
        for i in 0..40u64 {
            t.ingest(&[Reading::numeric("A", i as f64, 100 + i)]);
        }

        let snap = t.snapshot();
        let entry = snap.get(&DeviceId::new("A")).unwrap();
        assert_eq!(entry.history.len(), 30);
        // Exactly the 30 most recent values, in arrival order
        let expected: Vec<f64> = (10..40).map(|i| i as f64).collect();
        assert_eq!(entry.history.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_text_values_update_entry_without_history() {
        let mut t = tracker();
        t.ingest(&[Reading::numeric("EPD-1", 3.0, 100)]);
        t.ingest(&[Reading::new("EPD-1", ReadingValue::Text("#ff0000".to_string()), 200)]);

        let snap = t.snapshot();
        let entry = snap.get(&DeviceId::new("EPD-1")).unwrap();
        assert_eq!(entry.value, ReadingValue::Text("#ff0000".to_string()));
        // Non-numeric values do not enter the history
        assert_eq!(entry.history.as_slice(), &[3.0]);
    }

    #[test]
    fn test_sweep_evicts_stale_entries() {
        let mut t = LiveReadingTracker::new(10_000);
        t.ingest(&[Reading::numeric("A", 1.0, 1_000), Reading::numeric("B", 2.0, 9_000)]);

        // At t=11_000 A is exactly at the threshold (age 10_000, not beyond)
        assert!(t.sweep(11_000).is_empty());

        // Past the threshold A goes, B stays
        let evicted = t.sweep(11_001);
        assert_eq!(evicted, vec![DeviceId::new("A")]);
        let snap = t.snapshot();
        assert!(!snap.contains_key(&DeviceId::new("A")));
        assert!(snap.contains_key(&DeviceId::new("B")));
    }

    #[test]
    fn test_reading_after_eviction_recreates_entry() {
        let mut t = LiveReadingTracker::new(10_000);
        t.ingest(&[Reading::numeric("A", 1.0, 1_000)]);
        t.sweep(20_000);
        assert!(t.is_empty());

        // Eviction clears the monotonicity floor along with the entry
        let stats = t.ingest(&[Reading::numeric("A", 2.0, 500)]);
        assert_eq!(stats.accepted, 1);
    }

    #[test]
    fn test_snapshot_isolated_from_later_mutation() {
        let mut t = tracker();
        t.ingest(&[Reading::numeric("A", 1.0, 1_000)]);
        let snap = t.snapshot();
        t.ingest(&[Reading::numeric("A", 2.0, 2_000)]);
        t.sweep(u64::MAX);

        assert_eq!(snap.get(&DeviceId::new("A")).unwrap().value, ReadingValue::Number(1.0));
    }

    #[test]
    fn test_two_batch_scenario() {
        let mut t = tracker();
        t.ingest(&[Reading::numeric("A", 10.0, 100), Reading::numeric("B", 5.0, 100)]);
        t.ingest(&[Reading::numeric("A", 12.0, 90)]);

        let snap = t.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get(&DeviceId::new("A")).unwrap().value, ReadingValue::Number(10.0));
        assert_eq!(snap.get(&DeviceId::new("B")).unwrap().value, ReadingValue::Number(5.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_publishes_and_evicts() {
        let config = Config::default();
        let metrics = Arc::new(Metrics::new());
        let (service, mut snapshot_rx) = LiveFeedService::new(&config, metrics);

        let (batch_tx, batch_rx) = mpsc::channel(16);
        let (geometry_tx, geometry_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(service.run(batch_rx, geometry_rx, shutdown_rx));

        // A reading observed "now" becomes visible in the published snapshot
        batch_tx.send(vec![Reading::numeric("A", 10.0, epoch_ms())]).await.unwrap();
        snapshot_rx.changed().await.unwrap();
        assert!(snapshot_rx.borrow().live.contains_key(&DeviceId::new("A")));

        // Once wall-clock age exceeds the threshold, a sweep tick evicts it.
        // Paused tokio time auto-advances, but epoch_ms() is wall-clock, so
        // eviction is driven here with a directly staged stale reading.
        batch_tx
            .send(vec![Reading::numeric("B", 1.0, epoch_ms().saturating_sub(60_000))])
            .await
            .unwrap();
        snapshot_rx.changed().await.unwrap();
        // B arrived already past the staleness threshold; the next sweep
        // tick (1s period) reports it disconnected
        snapshot_rx.changed().await.unwrap();
        assert!(!snapshot_rx.borrow().live.contains_key(&DeviceId::new("B")));
        assert!(snapshot_rx.borrow().live.contains_key(&DeviceId::new("A")));

        let _ = geometry_tx;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_buffers_positions_until_geometry() {
        let config = Config::default();
        let metrics = Arc::new(Metrics::new());
        let (service, mut snapshot_rx) = LiveFeedService::new(&config, metrics);

        let (batch_tx, batch_rx) = mpsc::channel(16);
        let (geometry_tx, geometry_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(service.run(batch_rx, geometry_rx, shutdown_rx));

        let reading = Reading::new(
            "TAG-1",
            ReadingValue::Position(RawPosition { x: 100.0, y: 0.0 }),
            epoch_ms(),
        );
        batch_tx.send(vec![reading]).await.unwrap();
        snapshot_rx.changed().await.unwrap();
        // Live, but not yet mappable
        assert!(snapshot_rx.borrow().live.contains_key(&DeviceId::new("TAG-1")));
        assert!(snapshot_rx.borrow().markers.is_empty());

        // Geometry arrives; the buffered position is applied
        let geometry = ImageGeometry {
            left: 0.0,
            top: 0.0,
            width: 500.0,
            height: 300.0,
            scale_x: 1.0,
            scale_y: 1.0,
            physical_width_cm: Some(1000.0),
            physical_height_cm: Some(600.0),
        };
        geometry_tx.send(Some(geometry)).unwrap();
        snapshot_rx.changed().await.unwrap();
        let marker = *snapshot_rx.borrow().markers.get(&DeviceId::new("TAG-1")).unwrap();
        assert_eq!(marker.x, 50.0);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
