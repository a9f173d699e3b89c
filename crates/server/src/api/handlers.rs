//! HTTP request handlers and shared application state.

use crate::api::errors::ApiError;
use crate::api::metrics;
use crate::api::models::*;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use wikindex_core::Store;

/// Shared application state passed to every handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub prometheus_handle: PrometheusHandle,
    pub start_time: Instant,
    /// Cleared by a storage error, set again by the next successful store operation.
    pub store_healthy: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(store: Arc<Store>, prometheus_handle: PrometheusHandle) -> Self {
        Self {
            store,
            prometheus_handle,
            start_time: Instant::now(),
            store_healthy: Arc::new(AtomicBool::new(true)),
        }
    }
}

/// Runs a store operation on the blocking pool.
///
/// Once spawned the operation runs to completion even if the client goes
/// away, so a mutation is either fully applied or never started.
async fn run_store<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&Store) -> wikindex_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(&state.store);
    let result = tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "store task panicked");
            ApiError::Internal("Store task failed".into())
        })?;

    match &result {
        Ok(_) => state.store_healthy.store(true, Ordering::Relaxed),
        Err(e) if !e.is_client_error() => {
            tracing::error!(error = %e, "store operation failed");
            state.store_healthy.store(false, Ordering::Relaxed);
        }
        Err(_) => {}
    }
    result.map_err(ApiError::from)
}

/// `GET /health`
///
/// Always 200; never touches the store.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = if state.store_healthy.load(Ordering::Relaxed) {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthResponse {
        status: "ok",
        store,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// `GET /metrics`
pub async fn metrics_endpoint(State(state): State<AppState>) -> String {
    metrics::update_store_metrics(&state.store);
    state.prometheus_handle.render()
}

/// `POST /index`
///
/// The body is parsed as JSON whatever the `Content-Type` says.
pub async fn index_document(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?;
    let document = parse_document(&value)?;
    let doc_id = document.id.clone();

    run_store(&state, move |store| store.upsert(document)).await?;

    metrics::record_write_operation("index");
    tracing::info!(doc_id = %doc_id, "Document indexed");
    Ok(Json(StatusResponse::new("indexed")))
}

/// `DELETE /index/:id`
///
/// Deleting an unknown id succeeds.
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let doc_id = id.clone();
    let existed = run_store(&state, move |store| store.delete(&id)).await?;

    metrics::record_write_operation("delete");
    tracing::info!(doc_id = %doc_id, existed, "Document deleted");
    Ok(Json(StatusResponse::new("deleted")))
}

/// `GET /search`
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<String>>, ApiError> {
    let query = parse_search_params(&params)?;
    let search_type = search_type(&query);

    let ids = run_store(&state, move |store| store.search(&query)).await?;

    metrics::record_search_operation(search_type);
    tracing::debug!(search_type, results = ids.len(), "Search complete");
    Ok(Json(ids))
}

/// `POST /admin/compact`
pub async fn compact(State(state): State<AppState>) -> Result<Json<CompactResponse>, ApiError> {
    let stats = run_store(&state, |store| store.compact()).await?;

    metrics::record_write_operation("compact");
    metrics::update_store_metrics(&state.store);
    Ok(Json(CompactResponse {
        status: "compacted",
        documents: stats.documents,
    }))
}
