//! Measurement-frame to screen-frame position mapping
//!
//! Upstream positioning sources are inconsistent about their coordinate
//! convention: some report Cartesian center-origin, some image top-origin,
//! some negative offsets from the bottom edge. The mapper tolerates all
//! three with a magnitude-based heuristic, tried in a fixed priority order.
//! The heuristic can misclassify a genuinely top-origin point whose
//! magnitude happens to fit the center-origin band; callers that know their
//! frame should pin it with [`CoordinateConvention`].

use crate::domain::geometry::{DisplayPosition, ImageGeometry, RawPosition};

/// Vertical pixel offset applied to every mapped point, compensating for the
/// marker glyph's anchor sitting above its visual tip.
pub const MARKER_VERTICAL_OFFSET_PX: f64 = 12.0;

/// Vertical origin convention of the incoming measurement frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinateConvention {
    /// Detect per point: center-origin band first, then bottom-referenced
    /// negative, then top-origin
    #[default]
    Auto,
    /// y = 0 at the vertical center of the space, positive downward
    CenterOrigin,
    /// y measured upward from the bottom edge
    BottomOrigin,
    /// y measured downward from the top edge (image convention)
    TopOrigin,
}

/// Maps raw measurement positions onto the displayed reference image
#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    geometry: ImageGeometry,
    convention: CoordinateConvention,
    vertical_offset_px: f64,
}

impl CoordinateMapper {
    pub fn new(geometry: ImageGeometry) -> Self {
        Self {
            geometry,
            convention: CoordinateConvention::Auto,
            vertical_offset_px: MARKER_VERTICAL_OFFSET_PX,
        }
    }

    /// Pin the vertical-origin convention instead of per-point detection
    pub fn with_convention(mut self, convention: CoordinateConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Override the fixed vertical offset (pixels)
    pub fn with_vertical_offset(mut self, offset_px: f64) -> Self {
        self.vertical_offset_px = offset_px;
        self
    }

    #[inline]
    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    /// Map a raw position into displayed-image pixel space
    ///
    /// Interprets the input as centimeters when physical dimensions are
    /// configured, natural-image pixels otherwise. The result is clamped to
    /// the displayed bounding rectangle after the vertical offset is applied.
    pub fn map(&self, raw: RawPosition) -> DisplayPosition {
        let g = &self.geometry;

        let (mut x, mut y) = if g.has_physical_dims() {
            let phys_w = g.physical_width_cm.unwrap_or(0.0);
            let phys_h = g.physical_height_cm.unwrap_or(0.0);
            let adj_y = self.adjust_y(raw.y, phys_h);
            (g.left + (raw.x / phys_w) * g.width, g.top + (adj_y / phys_h) * g.height)
        } else {
            // No physical dims: input is in natural-image pixels
            let adj_y = self.adjust_y(raw.y, g.natural_height());
            (g.left + raw.x * g.scale_x, g.top + adj_y * g.scale_y)
        };

        y += self.vertical_offset_px;

        x = x.clamp(g.left, g.left + g.width);
        y = y.clamp(g.top, g.top + g.height);

        DisplayPosition { x, y }
    }

    /// Reinterpret a raw vertical coordinate as top-origin within `frame_h`
    fn adjust_y(&self, raw_y: f64, frame_h: f64) -> f64 {
        match self.convention {
            CoordinateConvention::Auto => {
                if (-frame_h / 2.0..=frame_h / 2.0).contains(&raw_y) {
                    frame_h / 2.0 + raw_y
                } else if raw_y < 0.0 {
                    (frame_h + raw_y).max(0.0)
                } else {
                    raw_y
                }
            }
            CoordinateConvention::CenterOrigin => frame_h / 2.0 + raw_y,
            CoordinateConvention::BottomOrigin => (frame_h - raw_y).max(0.0),
            CoordinateConvention::TopOrigin => raw_y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1000x600cm space displayed as a 500x300px box at (100, 50), no scaling
    fn physical_geometry() -> ImageGeometry {
        ImageGeometry {
            left: 100.0,
            top: 50.0,
            width: 500.0,
            height: 300.0,
            scale_x: 1.0,
            scale_y: 1.0,
            physical_width_cm: Some(1000.0),
            physical_height_cm: Some(600.0),
        }
    }

    /// 800x600px natural image displayed at half scale at (0, 0)
    fn pixel_geometry() -> ImageGeometry {
        ImageGeometry {
            left: 0.0,
            top: 0.0,
            width: 400.0,
            height: 300.0,
            scale_x: 0.5,
            scale_y: 0.5,
            physical_width_cm: None,
            physical_height_cm: None,
        }
    }

    fn mapper_without_offset(geometry: ImageGeometry) -> CoordinateMapper {
        CoordinateMapper::new(geometry).with_vertical_offset(0.0)
    }

    #[test]
    fn test_center_origin_detected_in_physical_mode() {
        let mapper = mapper_without_offset(physical_geometry());
        // y = 0 at space center maps to vertical middle of the display box
        let pos = mapper.map(RawPosition { x: 500.0, y: 0.0 });
        assert_eq!(pos.x, 100.0 + 250.0);
        assert_eq!(pos.y, 50.0 + 150.0);
        // y = -300 (top of the center-origin band) maps to the top edge
        let pos = mapper.map(RawPosition { x: 0.0, y: -300.0 });
        assert_eq!(pos.y, 50.0);
    }

    #[test]
    fn test_bottom_referenced_negative_detected() {
        let mapper = mapper_without_offset(physical_geometry());
        // y = -400 is outside the ±300 center band, so it is bottom-referenced:
        // adj_y = 600 - 400 = 200 -> 200/600 of the 300px box
        let pos = mapper.map(RawPosition { x: 0.0, y: -400.0 });
        assert_eq!(pos.y, 50.0 + 100.0);
    }

    #[test]
    fn test_large_positive_y_treated_as_top_origin() {
        let mapper = mapper_without_offset(physical_geometry());
        // y = 450 exceeds the center band, stays top-origin: 450/600 of 300px
        let pos = mapper.map(RawPosition { x: 0.0, y: 450.0 });
        assert_eq!(pos.y, 50.0 + 225.0);
    }

    #[test]
    fn test_clamps_not_extrapolates() {
        let mapper = mapper_without_offset(physical_geometry());
        // Twice the physical width must clamp to the right edge exactly
        let pos = mapper.map(RawPosition { x: 2000.0, y: 0.0 });
        assert_eq!(pos.x, 100.0 + 500.0);
        // Far below the space clamps to the bottom edge
        let pos = mapper.map(RawPosition { x: 0.0, y: 10_000.0 });
        assert_eq!(pos.y, 50.0 + 300.0);
    }

    #[test]
    fn test_pixel_mode_scales_by_display_factor() {
        let mapper = mapper_without_offset(pixel_geometry());
        // 800px natural -> 400px displayed; y = 500 exceeds the ±300 band
        let pos = mapper.map(RawPosition { x: 600.0, y: 500.0 });
        assert_eq!(pos.x, 300.0);
        assert_eq!(pos.y, 250.0);
    }

    #[test]
    fn test_pixel_mode_center_origin_band() {
        let mapper = mapper_without_offset(pixel_geometry());
        // Natural height 600 -> band is ±300; y = 100 reads as center-origin
        let pos = mapper.map(RawPosition { x: 0.0, y: 100.0 });
        assert_eq!(pos.y, (300.0 + 100.0) * 0.5);
    }

    #[test]
    fn test_vertical_offset_applied_before_clamp() {
        let mapper = CoordinateMapper::new(physical_geometry()).with_vertical_offset(12.0);
        // Bottom edge plus offset must still clamp to the bottom edge
        let pos = mapper.map(RawPosition { x: 0.0, y: 600.0 });
        assert_eq!(pos.y, 50.0 + 300.0);
        // Mid-space point carries the offset through
        let pos = mapper.map(RawPosition { x: 0.0, y: 0.0 });
        assert_eq!(pos.y, 50.0 + 150.0 + 12.0);
    }

    #[test]
    fn test_explicit_convention_overrides_heuristic() {
        let geom = physical_geometry();
        // y = 100 would read as center-origin under Auto
        let auto = mapper_without_offset(geom).map(RawPosition { x: 0.0, y: 100.0 });
        assert_eq!(auto.y, 50.0 + 200.0);

        let top = mapper_without_offset(geom)
            .with_convention(CoordinateConvention::TopOrigin)
            .map(RawPosition { x: 0.0, y: 100.0 });
        assert_eq!(top.y, 50.0 + 50.0);

        let bottom = mapper_without_offset(geom)
            .with_convention(CoordinateConvention::BottomOrigin)
            .map(RawPosition { x: 0.0, y: 100.0 });
        // 100cm up from the bottom of a 600cm space -> 500/600 of 300px
        assert_eq!(bottom.y, 50.0 + 250.0);
    }
}
