//! wikindex-server: HTTP search service for wiki content.
//!
//! Provides the REST API, middleware and metrics. Indexing, search and
//! storage live in `wikindex-core`.

/// REST API layer: Axum router, HTTP handlers, models, metrics.
pub mod api;
