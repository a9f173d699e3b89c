//! Latitude-ordered range index over document locations.
//!
//! Points live in a `BTreeMap` keyed by `(latitude, doc key)`, so the
//! latitude band of a bounding box is one range scan; longitude and exact
//! distance are checked on the survivors.

use crate::config;
use crate::spatial::geo::{haversine_km, BoundingBox, GeoPoint};
use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, HashMap};

/// Two-phase radius search structure.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    /// (lat, key) → lon
    by_lat: BTreeMap<(OrderedFloat<f64>, u32), f64>,
    /// key → stored point, for removal
    points: HashMap<u32, GeoPoint>,
}

impl SpatialIndex {
    /// Creates a new empty spatial index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores or moves the point for `key`.
    pub fn insert(&mut self, key: u32, point: GeoPoint) {
        self.remove(key);
        self.by_lat.insert((OrderedFloat(point.lat), key), point.lon);
        self.points.insert(key, point);
    }

    /// Removes the point for `key`, if any.
    pub fn remove(&mut self, key: u32) {
        if let Some(old) = self.points.remove(&key) {
            self.by_lat.remove(&(OrderedFloat(old.lat), key));
        }
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if no point is indexed.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Phase 1: every key whose point falls inside the box.
    pub fn candidates(&self, bbox: &BoundingBox) -> Vec<(u32, GeoPoint)> {
        let lower = (OrderedFloat(bbox.min_lat), u32::MIN);
        let upper = (OrderedFloat(bbox.max_lat), u32::MAX);
        self.by_lat
            .range(lower..=upper)
            .filter(|(_, &lon)| bbox.contains_lon(lon))
            .map(|(&(lat, key), &lon)| (key, GeoPoint { lat: lat.0, lon }))
            .collect()
    }

    /// Keys within `radius_km` of `center`, each with its distance in kilometers.
    pub fn within(&self, center: GeoPoint, radius_km: f64) -> Vec<(u32, f64)> {
        let bbox = BoundingBox::around(center, radius_km);
        self.candidates(&bbox)
            .into_iter()
            .filter_map(|(key, point)| {
                let d = haversine_km(center, point);
                (d <= radius_km + config::DISTANCE_TOLERANCE_KM).then_some((key, d))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint { lat, lon }
    }

    fn keys(mut hits: Vec<(u32, f64)>) -> Vec<u32> {
        hits.sort_by_key(|h| h.0);
        hits.into_iter().map(|h| h.0).collect()
    }

    #[test]
    fn test_radius_includes_near_excludes_far() {
        let mut idx = SpatialIndex::new();
        idx.insert(1, p(40.0, -74.0));
        idx.insert(2, p(0.0, 0.0));
        assert_eq!(keys(idx.within(p(40.0, -74.0), 1.0)), vec![1]);
    }

    #[test]
    fn test_box_corner_outside_radius_is_filtered() {
        let mut idx = SpatialIndex::new();
        // About 0.9 degrees north and east: inside a 100 km box, ~125 km away.
        idx.insert(1, p(40.85, -72.85));
        let center = p(40.0, -74.0);
        let bbox = BoundingBox::around(center, 100.0);
        assert!(bbox.contains(p(40.85, -72.85)));
        assert_eq!(idx.candidates(&bbox).len(), 1);
        assert!(idx.within(center, 100.0).is_empty());
        assert_eq!(keys(idx.within(center, 150.0)), vec![1]);
    }

    #[test]
    fn test_zero_radius_exact_point() {
        let mut idx = SpatialIndex::new();
        idx.insert(1, p(51.5, -0.12));
        idx.insert(2, p(51.5, -0.1201));
        assert_eq!(keys(idx.within(p(51.5, -0.12), 0.0)), vec![1]);
    }

    #[test]
    fn test_move_and_remove() {
        let mut idx = SpatialIndex::new();
        idx.insert(1, p(10.0, 10.0));
        idx.insert(1, p(-10.0, -10.0));
        assert_eq!(idx.len(), 1);
        assert!(idx.within(p(10.0, 10.0), 5.0).is_empty());
        assert_eq!(keys(idx.within(p(-10.0, -10.0), 5.0)), vec![1]);
        idx.remove(1);
        idx.remove(1);
        assert!(idx.is_empty());
        assert!(idx.within(p(-10.0, -10.0), 5.0).is_empty());
    }

    #[test]
    fn test_antimeridian_and_pole() {
        let mut idx = SpatialIndex::new();
        idx.insert(1, p(0.0, 179.99));
        idx.insert(2, p(89.99, 0.0));
        idx.insert(3, p(89.99, 180.0));
        assert_eq!(keys(idx.within(p(0.0, -179.99), 5.0)), vec![1]);
        assert_eq!(keys(idx.within(p(90.0, 0.0), 5.0)), vec![2, 3]);
    }

    #[test]
    fn test_distances_reported() {
        let mut idx = SpatialIndex::new();
        idx.insert(1, p(0.0, 1.0));
        let hits = idx.within(p(0.0, 0.0), 200.0);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].1 - 111.195).abs() < 0.01);
    }
}
