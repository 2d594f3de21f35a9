use axum::http::StatusCode;

use crate::services::metrics;

/// GET /metrics — Prometheus scrape endpoint.
pub async fn metrics_handler() -> Result<String, StatusCode> {
    metrics::render().map_err(|e| {
        tracing::error!(error = ?e, "failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
