//! Error types for the wikindex core library.
//!
//! Validation and query errors are raised before any lock is taken or any
//! byte is written, so they never leave partial state behind. Storage errors
//! are raised by the durable store and are never retried internally.

use std::io;

/// A document or search request that fails validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// A required field is absent.
    #[error("'{0}' is required")]
    MissingField(&'static str),

    /// A field is present but has the wrong shape or an unusable value.
    #[error("invalid '{field}': {message}")]
    InvalidField {
        /// Name of the offending field or query parameter.
        field: String,
        /// What went wrong.
        message: String,
    },

    /// Only part of a coordinate group was supplied.
    #[error("{0}")]
    IncompleteLocation(&'static str),

    /// A latitude, longitude or radius outside its allowed range.
    #[error("'{field}' out of range: {value} (expected {range})")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: f64,
        /// Human-readable allowed range.
        range: &'static str,
    },

    /// A size limit was exceeded.
    #[error("'{field}' exceeds the maximum of {max}")]
    TooLarge {
        /// Name of the offending field.
        field: &'static str,
        /// The configured limit.
        max: usize,
    },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::InvalidField`].
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// An unparseable full-text query.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("malformed query at byte {position}: {message}")]
pub struct QueryError {
    /// Byte offset into the query string where the problem was detected.
    pub position: usize,
    /// What went wrong.
    pub message: String,
}

impl QueryError {
    pub(crate) fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Errors returned by [`Store`](crate::storage::Store) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The request was rejected before touching the store.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The full-text query could not be parsed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Underlying persistence I/O failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),

    /// Persisted files are unreadable or inconsistent.
    #[error("corrupt store: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Returns `true` for errors caused by the caller's input rather than the store.
    pub fn is_client_error(&self) -> bool {
        matches!(self, StoreError::Validation(_) | StoreError::Query(_))
    }
}

/// Convenience `Result` alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
