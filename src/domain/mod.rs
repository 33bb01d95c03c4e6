//! Domain models - core data types for live readings and floor geometry
//!
//! This module contains the canonical data types used throughout the system:
//! - `Reading` - one observation from one device at one instant
//! - `LiveEntry` - a device's most recent accepted state with bounded history
//! - `Zone` / `ZoneCount` - named floorplan regions and their scalar metrics
//! - `ImageGeometry` - where the floorplan image is displayed on screen
//! - `RawPosition` / `DisplayPosition` - measurement-frame and screen-frame points

pub mod geometry;
pub mod types;
