//! Floorplan geometry: zones, the displayed reference image, and positions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Nested breakdown of a zone count: category -> sub-category -> count
pub type Demographics = HashMap<String, HashMap<String, f64>>;

/// Axis-aligned rectangle in reference-image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }

    /// Pixel center of the box
    #[inline]
    pub fn center(&self) -> (f64, f64) {
        (self.left + self.width / 2.0, self.top + self.height / 2.0)
    }
}

/// A named spatial region on the reference image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub zone_id: String,
    pub zone_name: String,
    pub bbox: BoundingBox,
}

/// Latest known scalar metric for a zone
///
/// `count` of `None` means "no data": the zone renders as a neutral
/// placeholder instead of a gradient contribution.
#[derive(Debug, Clone, Default)]
pub struct ZoneCount {
    pub zone_id: String,
    pub count: Option<f64>,
    pub demographics: Option<Demographics>,
}

/// Where the floorplan/reference image is displayed on screen
///
/// Supplied by the layout-loading collaborator. `left`/`top`/`width`/`height`
/// describe the displayed bounding box; `scale_x`/`scale_y` relate natural
/// image pixels to displayed pixels. Physical dimensions are present only
/// when the mapped space has a known real-world size.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ImageGeometry {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    #[serde(rename = "scaleX")]
    pub scale_x: f64,
    #[serde(rename = "scaleY")]
    pub scale_y: f64,
    #[serde(default, rename = "physicalWidthCm")]
    pub physical_width_cm: Option<f64>,
    #[serde(default, rename = "physicalHeightCm")]
    pub physical_height_cm: Option<f64>,
}

impl ImageGeometry {
    /// Natural (unscaled) image width in pixels
    #[inline]
    pub fn natural_width(&self) -> f64 {
        if self.scale_x > 0.0 {
            self.width / self.scale_x
        } else {
            self.width
        }
    }

    /// Natural (unscaled) image height in pixels
    #[inline]
    pub fn natural_height(&self) -> f64 {
        if self.scale_y > 0.0 {
            self.height / self.scale_y
        } else {
            self.height
        }
    }

    /// Whether both physical dimensions are configured and positive
    #[inline]
    pub fn has_physical_dims(&self) -> bool {
        matches!(
            (self.physical_width_cm, self.physical_height_cm),
            (Some(w), Some(h)) if w > 0.0 && h > 0.0
        )
    }
}

/// A raw coordinate in the external measurement frame
///
/// Units are ambiguous by contract: centimeters when physical dimensions are
/// configured, reference-image pixels otherwise. The vertical origin may be
/// image-top, space-center, or bottom-referenced-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawPosition {
    pub x: f64,
    pub y: f64,
}

/// A pixel position clamped to the displayed image rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplayPosition {
    pub x: f64,
    pub y: f64,
}

/// Derived per-zone rendering input, ephemeral per data batch
#[derive(Debug, Clone, PartialEq)]
pub struct IntensitySample {
    pub zone_id: String,
    /// Pixel center of the zone within the reference image
    pub x: f64,
    pub y: f64,
    /// Normalized to [0,1]; 0.5 for every zone when all counts are equal
    pub intensity: f64,
    /// Gradient radius in reference-image pixels
    pub radius: f64,
}

/// A zone with no data in the current batch: label position only
#[derive(Debug, Clone, PartialEq)]
pub struct ZonePlaceholder {
    pub zone_id: String,
    pub x: f64,
    pub y: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_center() {
        let bbox = BoundingBox::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(bbox.center(), (60.0, 45.0));
    }

    #[test]
    fn test_geometry_natural_dims() {
        let geom = ImageGeometry {
            left: 0.0,
            top: 0.0,
            width: 400.0,
            height: 300.0,
            scale_x: 0.5,
            scale_y: 0.5,
            physical_width_cm: None,
            physical_height_cm: None,
        };
        assert_eq!(geom.natural_width(), 800.0);
        assert_eq!(geom.natural_height(), 600.0);
        assert!(!geom.has_physical_dims());
    }

    #[test]
    fn test_geometry_physical_dims_require_both_positive() {
        let mut geom = ImageGeometry {
            left: 0.0,
            top: 0.0,
            width: 400.0,
            height: 300.0,
            scale_x: 1.0,
            scale_y: 1.0,
            physical_width_cm: Some(1000.0),
            physical_height_cm: None,
        };
        assert!(!geom.has_physical_dims());
        geom.physical_height_cm = Some(0.0);
        assert!(!geom.has_physical_dims());
        geom.physical_height_cm = Some(600.0);
        assert!(geom.has_physical_dims());
    }

    #[test]
    fn test_geometry_deserializes_collaborator_shape() {
        let json = r#"{
            "left": 12.0, "top": 8.0, "width": 640.0, "height": 480.0,
            "scaleX": 0.8, "scaleY": 0.8,
            "physicalWidthCm": 1200.0, "physicalHeightCm": 900.0
        }"#;
        let geom: ImageGeometry = serde_json::from_str(json).unwrap();
        assert_eq!(geom.left, 12.0);
        assert_eq!(geom.scale_x, 0.8);
        assert_eq!(geom.physical_width_cm, Some(1200.0));
    }
}
