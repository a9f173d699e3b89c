//! Search request types shared by the store and the HTTP layer.

use crate::config;
use crate::error::ValidationError;
use crate::spatial::GeoPoint;
use crate::text::TextQuery;

/// A "within `radius_km` of `center`" filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialFilter {
    pub center: GeoPoint,
    pub radius_km: f64,
}

impl SpatialFilter {
    /// Validates the coordinates and the radius.
    pub fn new(lat: f64, lon: f64, radius_km: f64) -> Result<Self, ValidationError> {
        let center = GeoPoint::new(lat, lon)?;
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "radius",
                value: radius_km,
                range: "a finite number >= 0",
            });
        }
        Ok(Self { center, radius_km })
    }
}

/// Every filter of one search request. Absent filters do not restrict the result;
/// a request with no filter at all matches every document.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub text: Option<TextQuery>,
    pub spatial: Option<SpatialFilter>,
    /// `metadata[key] == value` pairs, all required.
    pub metadata: Vec<(String, String)>,
    /// Tags, all required.
    pub tags: Vec<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SearchQuery {
    /// A query with no filters (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parsed full-text filter.
    pub fn with_text(mut self, text: TextQuery) -> Self {
        self.text = Some(text);
        self
    }

    /// Adds a radius filter.
    pub fn with_spatial(mut self, spatial: SpatialFilter) -> Self {
        self.spatial = Some(spatial);
        self
    }

    /// Adds a metadata equality filter.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    /// Adds a required tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Sets the page window.
    pub fn with_page(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Returns `true` if at least one filter is present.
    pub fn has_filters(&self) -> bool {
        self.text.is_some()
            || self.spatial.is_some()
            || !self.metadata.is_empty()
            || !self.tags.is_empty()
    }

    /// Checks the page window against the configured limits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(limit) = self.limit {
            if limit == 0 || limit > config::MAX_LIMIT {
                return Err(ValidationError::invalid(
                    "limit",
                    format!("must be 1-{}", config::MAX_LIMIT),
                ));
            }
        }
        if self.offset > config::MAX_OFFSET {
            return Err(ValidationError::TooLarge {
                field: "offset",
                max: config::MAX_OFFSET,
            });
        }
        Ok(())
    }
}
