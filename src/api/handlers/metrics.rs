//! Metrics handlers: snapshot, accuracy feedback, reset.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::app_state::AppState;
use crate::error::{ErrorResponse, ServiceError};
use crate::metrics::{AccuracyRecord, MetricsSnapshot};

/// `GET /metrics`: Current vision metrics.
#[utoipa::path(
    get,
    path = "/api/v1/metrics",
    tag = "Metrics",
    summary = "Vision metrics snapshot",
    description = "Request counts, success rate, accuracy, calibration error, and per-type breakdowns since the last reset.",
    responses(
        (status = 200, description = "Metrics snapshot", body = MetricsSnapshot),
    )
)]
pub async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// `POST /metrics/accuracy`: Record reviewed ground truth.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidRequest`] if the predicted confidence
/// is not a finite number.
#[utoipa::path(
    post,
    path = "/api/v1/metrics/accuracy",
    tag = "Metrics",
    summary = "Record accuracy feedback",
    description = "Records which extracted fields a reviewer marked correct, with the confidence the pipeline reported. Field names the document type does not extract are ignored.",
    request_body = AccuracyRecord,
    responses(
        (status = 204, description = "Recorded"),
        (status = 400, description = "Invalid record", body = ErrorResponse),
    )
)]
pub async fn record_accuracy(
    State(state): State<AppState>,
    Json(record): Json<AccuracyRecord>,
) -> Result<impl IntoResponse, ServiceError> {
    if !record.predicted_confidence.is_finite() {
        return Err(ServiceError::InvalidRequest(
            "predicted_confidence must be a number".to_string(),
        ));
    }
    state.metrics.record_accuracy(&record);
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /metrics`: Clear all metrics.
#[utoipa::path(
    delete,
    path = "/api/v1/metrics",
    tag = "Metrics",
    summary = "Reset metrics",
    description = "Clears every counter and restarts the collection window.",
    responses(
        (status = 204, description = "Metrics cleared"),
    )
)]
pub async fn reset_metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.reset();
    tracing::info!("metrics reset");
    StatusCode::NO_CONTENT
}

/// Metrics routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/metrics", get(get_metrics).delete(reset_metrics))
        .route("/metrics/accuracy", post(record_accuracy))
}
