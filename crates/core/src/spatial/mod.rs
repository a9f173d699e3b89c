//! Spatial search: validated points, haversine distance, bounding boxes and the range index.

/// Points, distances and bounding boxes.
pub mod geo;
/// Latitude-ordered range index with exact radius filtering.
pub mod index;

pub use geo::{haversine_km, BoundingBox, GeoPoint};
pub use index::SpatialIndex;
