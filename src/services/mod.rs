//! Services - reconciliation and rendering logic
//!
//! This module contains the core stateful services:
//! - `live_tracker` - live reading reconciliation with staleness eviction
//! - `coord_mapper` - measurement-frame to screen-frame position mapping
//! - `heatmap` - per-zone intensity normalization and gradient compositing
//! - `marker_layer` - live marker state for the indoor positioning view

pub mod coord_mapper;
pub mod heatmap;
pub mod live_tracker;
pub mod marker_layer;

// Re-export commonly used types
pub use coord_mapper::{CoordinateConvention, CoordinateMapper};
pub use heatmap::ZoneIntensityRenderer;
pub use live_tracker::{FloorSnapshot, LiveFeedService, LiveReadingTracker};
pub use marker_layer::MarkerLayer;
