//! Global configuration constants for wikindex.
//!
//! All tuning parameters, input validation limits, and server defaults are defined here.
//! These are compile-time constants; runtime configuration is handled via
//! [`StoreConfig`](crate::storage::StoreConfig) and the server's CLI arguments.

/// BM25 Okapi term frequency saturation parameter.
///
/// Controls how quickly term frequency saturates. Higher values allow TF to grow more.
/// Standard value is 1.2 (range: 1.0–2.0).
pub const BM25_K1: f32 = 1.2;

/// BM25 Okapi document length normalization parameter.
///
/// 0.0 = no normalization, 1.0 = full normalization. Standard value is 0.75.
pub const BM25_B: f32 = 0.75;

/// Mean Earth radius in kilometers, used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Lower bound for `cos(latitude)` when widening a bounding box in longitude.
///
/// Keeps the longitude span finite for query points on or next to a pole.
pub const MIN_COS_LATITUDE: f64 = 1e-12;

/// Slack added to the radius in the exact distance check, in kilometers.
///
/// Lets a zero radius match a point stored at exactly the query coordinate.
pub const DISTANCE_TOLERANCE_KM: f64 = 1e-9;

/// Position gap inserted between title and body tokens so phrases never
/// match across the two fields.
pub const FIELD_POSITION_GAP: u32 = 1;

/// Maximum length of a document id in bytes.
pub const MAX_ID_LEN: usize = 512;

/// Maximum combined length of title and body in bytes.
pub const MAX_TEXT_LEN: usize = 1_000_000;

/// Maximum number of metadata keys per document.
pub const MAX_METADATA_KEYS: usize = 64;

/// Maximum length of a metadata key or value in bytes.
pub const MAX_METADATA_FIELD_LEN: usize = 4096;

/// Maximum number of tags per document.
pub const MAX_TAGS: usize = 256;

/// Maximum length of a full-text query in bytes.
pub const MAX_QUERY_LEN: usize = 4096;

/// Maximum page size for search results.
pub const MAX_LIMIT: usize = 10_000;

/// Maximum pagination offset for search results.
pub const MAX_OFFSET: usize = 100_000;

/// Default number of pooled storage handles per store instance.
pub const DEFAULT_POOL_SIZE: usize = 32;

/// Default write-ahead log size that triggers compaction after a write (64 MB).
/// 0 disables size-triggered compaction.
pub const DEFAULT_COMPACT_THRESHOLD_BYTES: u64 = 64 * 1024 * 1024;

/// Default HTTP server port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default bind address.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default directory for the log, snapshot and lock files.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default interval (in seconds) between periodic compactions. 0 = disabled.
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 300;

/// Default graceful shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Per-request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum HTTP request body size in bytes (10 MB).
pub const MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Maximum number of concurrent in-flight requests.
pub const MAX_CONCURRENT_REQUESTS: usize = 512;
