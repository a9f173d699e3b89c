//! Geodesy helpers: validated points, haversine distance and bounding boxes.

use crate::config;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// Widening applied to every bounding box edge, in degrees, so rounding in the
/// box math can never drop a point the exact distance check would keep.
const BOX_SLACK_DEG: f64 = 1e-9;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Creates a point, rejecting non-finite or out-of-range coordinates.
    pub fn new(lat: f64, lon: f64) -> Result<Self, ValidationError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(ValidationError::OutOfRange {
                field: "lat",
                value: lat,
                range: "-90..=90",
            });
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(ValidationError::OutOfRange {
                field: "lon",
                value: lon,
                range: "-180..=180",
            });
        }
        Ok(Self { lat, lon })
    }
}

/// Great-circle distance in kilometers (haversine formula, R = 6371 km).
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * config::EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Rectangular pre-filter around a query circle.
///
/// Always a superset of the circle: latitude extent is `r / R`, longitude
/// extent is the exact spherical-cap width `asin(sin(r/R) / cos(lat))`. A cap
/// reaching a pole covers every longitude; a span crossing the antimeridian is
/// split in two.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    /// Inclusive longitude intervals; empty never, `[-180, 180]` for all.
    pub lon_spans: Vec<(f64, f64)>,
}

impl BoundingBox {
    /// Computes the box around `center` for a radius in kilometers.
    pub fn around(center: GeoPoint, radius_km: f64) -> Self {
        let angular = radius_km.max(0.0) / config::EARTH_RADIUS_KM;
        let lat = center.lat.to_radians();
        let lower = lat - angular;
        let upper = lat + angular;

        let min_lat = (lower.to_degrees() - BOX_SLACK_DEG).max(-90.0);
        let max_lat = (upper.to_degrees() + BOX_SLACK_DEG).min(90.0);

        if lower <= -FRAC_PI_2 || upper >= FRAC_PI_2 {
            return Self {
                min_lat,
                max_lat,
                lon_spans: vec![(-180.0, 180.0)],
            };
        }

        let cos_lat = lat.cos().max(config::MIN_COS_LATITUDE);
        let ratio = angular.sin() / cos_lat;
        if ratio >= 1.0 {
            return Self {
                min_lat,
                max_lat,
                lon_spans: vec![(-180.0, 180.0)],
            };
        }
        let dlon = ratio.asin().to_degrees() + BOX_SLACK_DEG;
        if dlon >= 180.0 {
            return Self {
                min_lat,
                max_lat,
                lon_spans: vec![(-180.0, 180.0)],
            };
        }

        let lo = center.lon - dlon;
        let hi = center.lon + dlon;
        let lon_spans = if lo < -180.0 {
            vec![(lo + 360.0, 180.0), (-180.0, hi)]
        } else if hi > 180.0 {
            vec![(lo, 180.0), (-180.0, hi - 360.0)]
        } else {
            vec![(lo, hi)]
        };
        Self {
            min_lat,
            max_lat,
            lon_spans,
        }
    }

    /// Returns `true` if the longitude falls inside one of the spans.
    pub fn contains_lon(&self, lon: f64) -> bool {
        self.lon_spans.iter().any(|&(lo, hi)| lo <= lon && lon <= hi)
    }

    /// Returns `true` if the point falls inside the box.
    pub fn contains(&self, point: GeoPoint) -> bool {
        self.min_lat <= point.lat && point.lat <= self.max_lat && self.contains_lon(point.lon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint { lat, lon }
    }

    #[test]
    fn test_new_validates_ranges() {
        assert!(GeoPoint::new(40.0, -74.0).is_ok());
        assert!(GeoPoint::new(90.0, 180.0).is_ok());
        assert!(GeoPoint::new(90.5, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.1).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_haversine_known_distances() {
        assert_eq!(haversine_km(p(40.0, -74.0), p(40.0, -74.0)), 0.0);
        // One degree of latitude on a 6371 km sphere.
        let d = haversine_km(p(0.0, 0.0), p(1.0, 0.0));
        assert!((d - 111.195).abs() < 0.01, "got {d}");
        // New York to London, roughly 5570 km.
        let d = haversine_km(p(40.7128, -74.0060), p(51.5074, -0.1278));
        assert!((d - 5570.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn test_haversine_across_antimeridian() {
        let d = haversine_km(p(0.0, 179.9), p(0.0, -179.9));
        assert!(d < 25.0, "got {d}");
    }

    #[test]
    fn test_box_contains_circle_edge() {
        let center = p(40.0, -74.0);
        let bbox = BoundingBox::around(center, 100.0);
        // Points exactly at distance 100 km due north and due east lie inside the box.
        let north = p(40.0 + (100.0 / config::EARTH_RADIUS_KM).to_degrees(), -74.0);
        assert!(bbox.contains(north));
        assert!(bbox.contains(p(40.0, -74.0 + 1.17)));
        assert!(!bbox.contains(p(42.0, -74.0)));
    }

    #[test]
    fn test_box_high_latitude_is_wider_than_linear_estimate() {
        let bbox = BoundingBox::around(p(80.0, 0.0), 1000.0);
        let (lo, hi) = bbox.lon_spans[0];
        let linear = (1000.0 / config::EARTH_RADIUS_KM).to_degrees() / 80f64.to_radians().cos();
        assert!(hi - lo > 2.0 * linear);
    }

    #[test]
    fn test_box_touching_pole_covers_all_longitudes() {
        let bbox = BoundingBox::around(p(89.9, 10.0), 50.0);
        assert_eq!(bbox.max_lat, 90.0);
        assert_eq!(bbox.lon_spans, vec![(-180.0, 180.0)]);
    }

    #[test]
    fn test_box_splits_at_antimeridian() {
        let bbox = BoundingBox::around(p(0.0, 179.95), 20.0);
        assert_eq!(bbox.lon_spans.len(), 2);
        assert!(bbox.contains_lon(-179.95));
        assert!(bbox.contains_lon(179.9));
        assert!(!bbox.contains_lon(0.0));
    }

    #[test]
    fn test_zero_radius_box_contains_center() {
        let center = p(12.5, 45.25);
        assert!(BoundingBox::around(center, 0.0).contains(center));
    }
}
