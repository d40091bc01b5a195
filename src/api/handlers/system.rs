//! System endpoints: health check, document type catalog.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::dto::DocumentTypeInfo;
use crate::app_state::AppState;
use crate::domain::{DocumentProcessingResult, DocumentType};
use crate::metrics::{HealthStatus, assess_health};

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: HealthStatus,
    issues: Vec<String>,
    total_requests: u64,
    success_rate: f64,
    overall_accuracy: f64,
    avg_processing_time_ms: f64,
    timestamp: String,
    version: String,
}

/// `GET /health`: Service health derived from vision metrics.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Classifies current vision metrics as healthy, warning, or critical. Critical returns 503.",
    responses(
        (status = 200, description = "Healthy or warning", body = HealthResponse),
        (status = 503, description = "Critical", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();
    let assessment = assess_health(&snapshot);
    let code = if assessment.status == HealthStatus::Critical {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (
        code,
        Json(HealthResponse {
            status: assessment.status,
            issues: assessment.issues,
            total_requests: snapshot.total_requests,
            success_rate: snapshot.success_rate,
            overall_accuracy: snapshot.overall_accuracy,
            avg_processing_time_ms: snapshot.avg_processing_time_ms,
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// `GET /config/document-types`: List supported document types.
#[utoipa::path(
    get,
    path = "/config/document-types",
    tag = "System",
    summary = "List supported document types",
    description = "Returns every document type the service understands and whether a processor is registered for it.",
    responses(
        (status = 200, description = "Document type catalog", body = Vec<DocumentTypeInfo>),
    )
)]
pub async fn document_types_handler(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.document_service.registry();
    let mut types = Vec::with_capacity(DocumentType::ALL.len());
    for document_type in DocumentType::ALL {
        types.push(DocumentTypeInfo {
            document_type,
            description: document_type.description(),
            event_type: DocumentProcessingResult::event_type_for(document_type)
                .as_str()
                .to_string(),
            registered: registry.contains(document_type).await,
        });
    }
    (StatusCode::OK, Json(types))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config/document-types", get(document_types_handler))
}
