//! Shared types for the live reading pipeline

use crate::domain::geometry::RawPosition;
use serde::Serialize;
use smallvec::SmallVec;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of values retained per device in [`LiveEntry::history`]
pub const DEFAULT_HISTORY_LEN: usize = 30;

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Newtype wrapper for device identifiers to provide type safety
///
/// The source system calls these TINs; here they are opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[repr(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The magnitude carried by a reading
///
/// Most metrics are numeric; EPD-style devices report raw display strings
/// (e.g. a hex color), and indoor positioning tags report coordinate pairs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReadingValue {
    Number(f64),
    Text(String),
    Position(RawPosition),
}

impl ReadingValue {
    /// Numeric magnitude, if this value has one
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ReadingValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Coordinate pair, if this value is a position
    #[inline]
    pub fn as_position(&self) -> Option<RawPosition> {
        match self {
            ReadingValue::Position(p) => Some(*p),
            _ => None,
        }
    }
}

/// One observation from one device at one instant
///
/// `observed_at` is the capture timestamp (epoch ms), not receipt time.
/// A reading older than the stored entry for the same device is discarded
/// by the tracker (per-device monotonicity, not global).
#[derive(Debug, Clone)]
pub struct Reading {
    pub device_id: DeviceId,
    pub value: ReadingValue,
    pub unit: Option<String>,
    pub observed_at: u64,
}

impl Reading {
    pub fn new(device_id: impl Into<String>, value: ReadingValue, observed_at: u64) -> Self {
        Self { device_id: DeviceId::new(device_id), value, unit: None, observed_at }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    /// Shorthand for a numeric reading (the common case in tests and the simulator)
    pub fn numeric(device_id: impl Into<String>, value: f64, observed_at: u64) -> Self {
        Self::new(device_id, ReadingValue::Number(value), observed_at)
    }
}

/// A device's most recent accepted state, as materialized by the tracker
///
/// Created on the first accepted reading, updated on each subsequent one,
/// evicted when the reading age exceeds the staleness threshold.
#[derive(Debug, Clone)]
pub struct LiveEntry {
    pub device_id: DeviceId,
    /// Most recent accepted value
    pub value: ReadingValue,
    pub unit: Option<String>,
    /// Capture timestamp (epoch ms) of the most recent accepted reading
    pub observed_at: u64,
    /// Up to N most recent numeric values, in arrival order
    pub history: SmallVec<[f64; 8]>,
}

impl LiveEntry {
    pub fn from_reading(reading: &Reading) -> Self {
        let mut entry = Self {
            device_id: reading.device_id.clone(),
            value: reading.value.clone(),
            unit: reading.unit.clone(),
            observed_at: reading.observed_at,
            history: SmallVec::new(),
        };
        if let Some(n) = reading.value.as_number() {
            entry.history.push(n);
        }
        entry
    }
}
