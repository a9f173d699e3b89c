//! Core document type for wikindex.
//!
//! A [`Document`] is the unit of indexing: a client-supplied id, free text
//! (title and body), string metadata, a tag set, and an optional location.
//! Re-indexing the same id replaces the whole document.

use crate::config;
use crate::error::ValidationError;
use crate::spatial::GeoPoint;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A stored document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    /// Unique, client-supplied primary key.
    pub id: String,
    /// Title text, indexed for full-text search.
    pub title: String,
    /// Body text, indexed for full-text search.
    pub body: String,
    /// Key/value metadata, each pair queryable by equality.
    pub metadata: BTreeMap<String, String>,
    /// Tag set, queryable by membership.
    pub tags: BTreeSet<String>,
    /// Optional point location for radius queries.
    pub location: Option<GeoPoint>,
}

impl Document {
    /// Creates a document with the given id and no content.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds one metadata pair.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Adds one tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Sets the location.
    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }

    /// Checks every field against the configured limits.
    ///
    /// Called by the store before any mutation is attempted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("id"));
        }
        if self.id.len() > config::MAX_ID_LEN {
            return Err(ValidationError::TooLarge {
                field: "id",
                max: config::MAX_ID_LEN,
            });
        }
        if self.title.len() + self.body.len() > config::MAX_TEXT_LEN {
            return Err(ValidationError::TooLarge {
                field: "title+body",
                max: config::MAX_TEXT_LEN,
            });
        }
        if self.metadata.len() > config::MAX_METADATA_KEYS {
            return Err(ValidationError::TooLarge {
                field: "metadata",
                max: config::MAX_METADATA_KEYS,
            });
        }
        for (key, value) in &self.metadata {
            if key.is_empty() {
                return Err(ValidationError::invalid("metadata", "keys must not be empty"));
            }
            if key.len() > config::MAX_METADATA_FIELD_LEN
                || value.len() > config::MAX_METADATA_FIELD_LEN
            {
                return Err(ValidationError::TooLarge {
                    field: "metadata",
                    max: config::MAX_METADATA_FIELD_LEN,
                });
            }
        }
        if self.tags.len() > config::MAX_TAGS {
            return Err(ValidationError::TooLarge {
                field: "tags",
                max: config::MAX_TAGS,
            });
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(ValidationError::invalid("tags", "tags must not be empty"));
        }
        if let Some(location) = self.location {
            GeoPoint::new(location.lat, location.lon)?;
        }
        Ok(())
    }
}
