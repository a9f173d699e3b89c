//! Prometheus metrics recording and background collection.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use wikindex_core::Store;

/// Records HTTP request metrics.
pub fn record_request(method: &str, path: &str, status: u16, duration: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];
    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Records a write operation metric (`index`, `delete`, `compact`).
pub fn record_write_operation(operation: &str) {
    counter!(
        "wikindex_operations_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Records a search operation metric, labelled by how results were ordered.
pub fn record_search_operation(search_type: &str) {
    counter!(
        "wikindex_search_total",
        "type" => search_type.to_string()
    )
    .increment(1);
}

/// Updates the document-count and log-size gauges.
///
/// The document count is this instance's view as of its last operation.
pub fn update_store_metrics(store: &Store) {
    gauge!("wikindex_documents_total").set(store.document_count() as f64);
    match store.wal_size_bytes() {
        Ok(bytes) => gauge!("wikindex_wal_size_bytes").set(bytes as f64),
        Err(e) => tracing::warn!(error = %e, "could not read WAL size"),
    }
}
