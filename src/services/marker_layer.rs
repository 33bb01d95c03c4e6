//! Live marker state for the indoor positioning view
//!
//! Holds the latest mapped screen position per device. Position updates that
//! arrive before the display geometry is known are buffered (latest per
//! device only) and applied once geometry lands.

use crate::domain::geometry::{DisplayPosition, RawPosition};
use crate::domain::types::DeviceId;
use crate::services::coord_mapper::CoordinateMapper;
use rustc_hash::FxHashMap;
use tracing::debug;

/// Latest marker position per device, in displayed-image pixel space
#[derive(Default)]
pub struct MarkerLayer {
    mapper: Option<CoordinateMapper>,
    markers: FxHashMap<DeviceId, DisplayPosition>,
    /// Latest raw position per device while geometry is unavailable
    pending: FxHashMap<DeviceId, RawPosition>,
}

impl MarkerLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the display geometry and flush the backlog
    ///
    /// Returns how many buffered positions were applied.
    pub fn set_geometry(&mut self, mapper: CoordinateMapper) -> usize {
        self.mapper = Some(mapper);
        let pending = std::mem::take(&mut self.pending);
        let applied = pending.len();
        for (device_id, raw) in pending {
            self.update(&device_id, raw);
        }
        applied
    }

    /// Record a device's latest raw position
    ///
    /// Returns the mapped display position, or None while geometry is
    /// unavailable (the raw position is buffered, replacing any older one).
    pub fn update(&mut self, device_id: &DeviceId, raw: RawPosition) -> Option<DisplayPosition> {
        match &self.mapper {
            Some(mapper) => {
                let mapped = mapper.map(raw);
                self.markers.insert(device_id.clone(), mapped);
                Some(mapped)
            }
            None => {
                debug!(device_id = %device_id, "marker_deferred_no_geometry");
                self.pending.insert(device_id.clone(), raw);
                None
            }
        }
    }

    /// Drop a device's marker (and any buffered position)
    pub fn remove(&mut self, device_id: &DeviceId) {
        self.markers.remove(device_id);
        self.pending.remove(device_id);
    }

    /// Owned copy of the current marker positions
    pub fn snapshot(&self) -> FxHashMap<DeviceId, DisplayPosition> {
        self.markers.clone()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}
