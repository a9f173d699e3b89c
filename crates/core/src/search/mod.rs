//! Search request model and result combination.
//!
//! Each filter of a [`SearchQuery`] produces a candidate set of internal doc
//! keys; [`combiner`] intersects them and orders the survivors.

/// Candidate intersection, ranking and paging.
pub mod combiner;
/// Search request types.
pub mod types;

pub use combiner::{intersect, paginate, rank, Ranking};
pub use types::{SearchQuery, SpatialFilter};
