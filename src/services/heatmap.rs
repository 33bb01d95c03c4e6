//! Per-zone intensity normalization and radial-gradient compositing
//!
//! Turns discrete per-zone counts into a continuous visual intensity field:
//! counts are normalized against the batch maximum, each zone gets a radial
//! gradient centered on its bounding box, and the gradients are composited
//! onto a transparent raster the size of the reference image. The raster is
//! the overlay layer; labels are drawn above it by the presentation layer.

use crate::domain::geometry::{IntensitySample, Zone, ZoneCount, ZonePlaceholder};
use image::{Rgba, RgbaImage};
use tracing::debug;

/// Gradient radius at intensity zero, as a fraction of the longer image side
const BASE_RADIUS_FRACTION: f64 = 0.15;

/// Default color ramp, low to high
pub const DEFAULT_RAMP: [&str; 5] = ["#0000ff", "#00ffff", "#00ff00", "#ffff00", "#ff0000"];

/// Default overlay opacity
pub const DEFAULT_ALPHA: f64 = 0.6;

/// Parse a `#rrggbb` hex color
pub fn parse_hex_color(s: &str) -> Option<[u8; 3]> {
    let hex = s.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b])
}

/// Ordered list of gradient colors from "low" to "high"
#[derive(Debug, Clone)]
pub struct ColorRamp {
    colors: Vec<[u8; 3]>,
}

impl ColorRamp {
    /// Build from hex color strings; fails on an empty or malformed list
    pub fn from_hex(colors: &[String]) -> Option<Self> {
        if colors.is_empty() {
            return None;
        }
        let colors = colors.iter().map(|s| parse_hex_color(s)).collect::<Option<Vec<_>>>()?;
        Some(Self { colors })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

impl Default for ColorRamp {
    fn default() -> Self {
        let colors = DEFAULT_RAMP.iter().map(|s| parse_hex_color(s).unwrap()).collect();
        Self { colors }
    }
}

/// One stop of a radial gradient: position along the radius plus RGBA
#[derive(Debug, Clone, Copy)]
struct GradientStop {
    pos: f64,
    color: [u8; 3],
    alpha: f64,
}

/// Everything derived from one data batch
#[derive(Debug, Clone, Default)]
pub struct HeatmapBatch {
    /// Sorted ascending by intensity so hot spots paint last (on top)
    pub samples: Vec<IntensitySample>,
    /// Zones without data: label position only, no gradient contribution
    pub placeholders: Vec<ZonePlaceholder>,
}

/// Renders per-zone counts as a composited gradient overlay
#[derive(Debug, Clone)]
pub struct ZoneIntensityRenderer {
    ramp: ColorRamp,
    alpha: f64,
}

impl ZoneIntensityRenderer {
    pub fn new(ramp: ColorRamp, alpha: f64) -> Self {
        Self { ramp, alpha: alpha.clamp(0.0, 1.0) }
    }

    /// Normalize counts into intensity samples
    ///
    /// Intensity is `count / max` over the zones with a defined count, or
    /// 0.5 for every zone when all defined counts are equal. Radius scales
    /// with intensity between 0.5x and 1.3x of the base radius, which is
    /// proportional to the longer image dimension.
    pub fn compute_samples(
        &self,
        counts: &[ZoneCount],
        zones: &[Zone],
        image_w: f64,
        image_h: f64,
    ) -> HeatmapBatch {
        let defined: Vec<(&Zone, f64)> = zones
            .iter()
            .filter_map(|zone| {
                counts
                    .iter()
                    .find(|c| c.zone_id == zone.zone_id)
                    .and_then(|c| c.count)
                    .map(|count| (zone, count))
            })
            .collect();

        let max = defined.iter().map(|(_, c)| *c).fold(f64::MIN, f64::max);
        let all_equal =
            defined.iter().all(|(_, c)| *c == defined[0].1) || max <= 0.0;

        let base_radius = BASE_RADIUS_FRACTION * image_w.max(image_h);

        let mut samples = Vec::with_capacity(defined.len());
        for (zone, count) in &defined {
            let intensity = if all_equal { 0.5 } else { count / max };
            let (x, y) = zone.bbox.center();
            samples.push(IntensitySample {
                zone_id: zone.zone_id.clone(),
                x,
                y,
                intensity,
                radius: base_radius * (0.5 + intensity * 0.8),
            });
        }
        samples.sort_by(|a, b| a.intensity.total_cmp(&b.intensity));

        let placeholders = zones
            .iter()
            .filter(|zone| !defined.iter().any(|(z, _)| z.zone_id == zone.zone_id))
            .map(|zone| {
                let (x, y) = zone.bbox.center();
                ZonePlaceholder { zone_id: zone.zone_id.clone(), x, y }
            })
            .collect::<Vec<_>>();

        debug!(
            samples = samples.len(),
            placeholders = placeholders.len(),
            "heatmap_batch_computed"
        );
        HeatmapBatch { samples, placeholders }
    }

    /// Composite the samples onto a fresh transparent raster
    ///
    /// Each call produces a new overlay; recomputing with a new batch fully
    /// replaces the previous one rather than blending into it.
    pub fn render(&self, samples: &[IntensitySample], width: u32, height: u32) -> RgbaImage {
        // Straight-alpha accumulation buffer, composited back-to-front
        let mut buf = vec![[0.0f64; 4]; (width as usize) * (height as usize)];

        for sample in samples {
            let stops = self.build_stops(sample.intensity);
            paint_radial(&mut buf, width, height, sample, &stops);
        }

        let mut img = RgbaImage::new(width, height);
        for (i, px) in buf.iter().enumerate() {
            let x = (i % width as usize) as u32;
            let y = (i / width as usize) as u32;
            img.put_pixel(
                x,
                y,
                Rgba([
                    (px[0] * 255.0).round() as u8,
                    (px[1] * 255.0).round() as u8,
                    (px[2] * 255.0).round() as u8,
                    (px[3] * 255.0).round() as u8,
                ]),
            );
        }
        img
    }

    /// Convenience: compute and render in one step
    pub fn render_counts(
        &self,
        counts: &[ZoneCount],
        zones: &[Zone],
        width: u32,
        height: u32,
    ) -> (RgbaImage, HeatmapBatch) {
        let batch = self.compute_samples(counts, zones, width as f64, height as f64);
        let img = self.render(&batch.samples, width, height);
        (img, batch)
    }

    /// Build the stop list for one zone's gradient
    ///
    /// Walks the ramp from the intensity-implied index down to index 0 with
    /// decreasing opacity, terminating in a fully transparent outer stop.
    fn build_stops(&self, intensity: f64) -> Vec<GradientStop> {
        let top = (intensity * (self.ramp.len() - 1) as f64).round() as usize;
        let n_stops = top + 2;
        let mut stops = Vec::with_capacity(n_stops);
        for (i, ramp_idx) in (0..=top).rev().enumerate() {
            let pos = i as f64 / (n_stops - 1) as f64;
            stops.push(GradientStop {
                pos,
                color: self.ramp.colors[ramp_idx],
                alpha: self.alpha * (1.0 - pos),
            });
        }
        stops.push(GradientStop { pos: 1.0, color: self.ramp.colors[0], alpha: 0.0 });
        stops
    }
}

impl Default for ZoneIntensityRenderer {
    fn default() -> Self {
        Self::new(ColorRamp::default(), DEFAULT_ALPHA)
    }
}

impl ZoneIntensityRenderer {
    /// Build from application config, falling back to the default ramp when
    /// the configured one fails to parse
    pub fn from_config(config: &crate::infra::config::Config) -> Self {
        let ramp = ColorRamp::from_hex(config.heatmap_ramp()).unwrap_or_else(|| {
            tracing::warn!("heatmap_ramp_invalid: using default");
            ColorRamp::default()
        });
        Self::new(ramp, config.heatmap_alpha())
    }
}

/// Paint one radial gradient into the accumulation buffer ("over" blending)
fn paint_radial(
    buf: &mut [[f64; 4]],
    width: u32,
    height: u32,
    sample: &IntensitySample,
    stops: &[GradientStop],
) {
    let r = sample.radius;
    if r <= 0.0 || width == 0 || height == 0 {
        return;
    }
    let x_min = ((sample.x - r).floor().max(0.0)) as u32;
    let x_max = ((sample.x + r).ceil().min(width as f64 - 1.0)) as u32;
    let y_min = ((sample.y - r).floor().max(0.0)) as u32;
    let y_max = ((sample.y + r).ceil().min(height as f64 - 1.0)) as u32;
    if x_min > x_max || y_min > y_max {
        return;
    }

    for py in y_min..=y_max {
        for px in x_min..=x_max {
            let dx = px as f64 + 0.5 - sample.x;
            let dy = py as f64 + 0.5 - sample.y;
            let t = (dx * dx + dy * dy).sqrt() / r;
            if t > 1.0 {
                continue;
            }
            let (color, alpha) = sample_stops(stops, t);
            if alpha <= 0.0 {
                continue;
            }
            let dst = &mut buf[py as usize * width as usize + px as usize];
            let sa = alpha;
            let da = dst[3];
            let out_a = sa + da * (1.0 - sa);
            for c in 0..3 {
                let sc = color[c] as f64 / 255.0;
                dst[c] = (sc * sa + dst[c] * da * (1.0 - sa)) / out_a;
            }
            dst[3] = out_a;
        }
    }
}

/// Linear interpolation over the stop list at radial distance `t`
fn sample_stops(stops: &[GradientStop], t: f64) -> ([u8; 3], f64) {
    debug_assert!(!stops.is_empty());
    if t <= stops[0].pos {
        return (stops[0].color, stops[0].alpha);
    }
    for pair in stops.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if t <= b.pos {
            let span = b.pos - a.pos;
            let f = if span > 0.0 { (t - a.pos) / span } else { 1.0 };
            let lerp = |x: u8, y: u8| x as f64 + (y as f64 - x as f64) * f;
            let color = [
                lerp(a.color[0], b.color[0]).round() as u8,
                lerp(a.color[1], b.color[1]).round() as u8,
                lerp(a.color[2], b.color[2]).round() as u8,
            ];
            return (color, a.alpha + (b.alpha - a.alpha) * f);
        }
    }
    let last = stops[stops.len() - 1];
    (last.color, last.alpha)
}
