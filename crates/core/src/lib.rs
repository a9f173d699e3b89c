//! # wikindex-core
//!
//! Embeddable document index with full-text, geospatial and metadata search
//! over a durable store that several processes can share.
//!
//! This is the core library crate with zero async dependencies; the HTTP
//! service lives in `wikindex-server`.
//!
//! ```no_run
//! use wikindex_core::{Document, Store, StoreConfig};
//!
//! let store = Store::open(StoreConfig::new("./data"))?;
//! store.upsert(Document::new("1").with_title("Hello").with_body("Hello world"))?;
//! assert_eq!(store.text_search("hello")?, vec!["1"]);
//! # Ok::<(), wikindex_core::StoreError>(())
//! ```

/// Global configuration constants: limits, defaults, and tuning parameters.
pub mod config;
/// Core document type.
pub mod document;
/// Validation, query and storage errors.
pub mod error;
/// Metadata equality and tag index.
pub mod metadata;
/// Search request model and result combination.
pub mod search;
/// Geographic primitives and the radius-search index.
pub mod spatial;
/// Storage layer: document store, write-ahead log, snapshots and locking.
pub mod storage;
/// Full-text search: tokenizer, positional inverted index, query language and BM25 scoring.
pub mod text;

pub use document::Document;
pub use error::{QueryError, Result, StoreError, ValidationError};
pub use search::{SearchQuery, SpatialFilter};
pub use spatial::GeoPoint;
pub use storage::{CompactionStats, Store, StoreConfig};
pub use text::TextQuery;
