//! Shape-tolerant payload parsing for the live feed
//!
//! Backend payloads are inconsistent: a single object or an array, with
//! field names that vary by source (`tin` vs `asset_id` vs `id`; `x` vs
//! `img_x` vs `x_px`). Each logical field has a fixed, ordered list of
//! candidate names; the first present, non-null value wins. Malformed
//! objects are dropped and logged without affecting the rest of the batch.

use crate::domain::geometry::{Demographics, RawPosition, ZoneCount};
use crate::domain::types::{DeviceId, Reading, ReadingValue};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Device identifier candidates, in probe order
const ID_FIELDS: &[&str] = &["tin", "asset_id", "assetId", "id"];
const X_FIELDS: &[&str] = &["x", "img_x", "x_px", "longitude"];
const Y_FIELDS: &[&str] = &["y", "img_y", "y_px", "latitude"];
const VALUE_FIELDS: &[&str] = &["value"];
const UNIT_FIELDS: &[&str] = &["unit"];
const TIMESTAMP_FIELDS: &[&str] = &["timestamp"];

/// Zone-count candidates (retail heatmap payloads)
const ZONE_ID_FIELDS: &[&str] = &["zone_id", "zoneId", "id"];
const COUNT_FIELDS: &[&str] = &["count", "visitor_count", "interaction_count"];

/// Result of normalizing one payload
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub readings: Vec<Reading>,
    /// Objects dropped for missing a required field
    pub malformed: usize,
}

/// Normalize a raw payload (object or array of objects) into readings
///
/// `received_at_ms` backfills `observed_at` when the payload carries no
/// timestamp. An unparseable payload yields an empty batch.
pub fn parse_payload(payload: &str, received_at_ms: u64) -> ParsedBatch {
    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "payload_parse_failed");
            return ParsedBatch { readings: Vec::new(), malformed: 1 };
        }
    };

    let objects: Vec<&Value> = match &value {
        Value::Array(items) => items.iter().collect(),
        obj @ Value::Object(_) => vec![obj],
        _ => {
            warn!("payload_unexpected_shape");
            return ParsedBatch { readings: Vec::new(), malformed: 1 };
        }
    };

    let mut batch = ParsedBatch::default();
    batch.readings.reserve(objects.len());
    for obj in objects {
        match parse_reading(obj, received_at_ms) {
            Some(reading) => batch.readings.push(reading),
            None => {
                batch.malformed += 1;
                warn!(object = %obj, "reading_malformed_dropped");
            }
        }
    }
    batch
}

fn parse_reading(obj: &Value, received_at_ms: u64) -> Option<Reading> {
    let device_id = first_field(obj, ID_FIELDS).and_then(field_as_string)?;
    let value = parse_value(obj)?;
    let observed_at = first_field(obj, TIMESTAMP_FIELDS)
        .and_then(parse_timestamp)
        .unwrap_or(received_at_ms);
    let unit = first_field(obj, UNIT_FIELDS).and_then(field_as_string);
    Some(Reading { device_id: DeviceId::new(device_id), value, unit, observed_at })
}

fn parse_value(obj: &Value) -> Option<ReadingValue> {
    if let Some(v) = first_field(obj, VALUE_FIELDS) {
        return match v {
            Value::Number(n) => n.as_f64().map(ReadingValue::Number),
            // Numeric strings carry numbers; anything else is a raw
            // display string (e.g. an EPD hex color)
            Value::String(s) => Some(
                s.parse::<f64>()
                    .map(ReadingValue::Number)
                    .unwrap_or_else(|_| ReadingValue::Text(s.clone())),
            ),
            _ => None,
        };
    }
    let x = first_field(obj, X_FIELDS).and_then(Value::as_f64)?;
    let y = first_field(obj, Y_FIELDS).and_then(Value::as_f64)?;
    Some(ReadingValue::Position(RawPosition { x, y }))
}

/// Parse the zone-count payload of the retail heatmap backend
///
/// Expects an array of `{ zone_id, count|visitor_count|interaction_count,
/// demographics? }` objects; unrecognized entries are skipped.
pub fn parse_zone_counts(payload: &str) -> Vec<ZoneCount> {
    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "zone_counts_parse_failed");
            return Vec::new();
        }
    };
    let Value::Array(items) = value else {
        warn!("zone_counts_unexpected_shape");
        return Vec::new();
    };

    let mut counts = Vec::with_capacity(items.len());
    for item in &items {
        let Some(zone_id) = first_field(item, ZONE_ID_FIELDS).and_then(field_as_string) else {
            debug!(object = %item, "zone_count_missing_id");
            continue;
        };
        let count = first_field(item, COUNT_FIELDS).and_then(Value::as_f64);
        let demographics = item
            .get("demographics")
            .cloned()
            .and_then(|v| serde_json::from_value::<Demographics>(v).ok());
        counts.push(ZoneCount { zone_id, count, demographics });
    }
    counts
}

/// First present, non-null value among the candidate field names
fn first_field<'a>(obj: &'a Value, candidates: &[&str]) -> Option<&'a Value> {
    candidates.iter().filter_map(|name| obj.get(*name)).find(|v| !v.is_null())
}

fn field_as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Timestamp as epoch ms: ISO-8601 string or a raw epoch-ms number
fn parse_timestamp(v: &Value) -> Option<u64> {
    match v {
        Value::String(s) => OffsetDateTime::parse(s, &Rfc3339)
            .ok()
            .map(|dt| (dt.unix_timestamp_nanos() / 1_000_000) as u64),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}
