//! Processor registry handlers.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::app_state::AppState;
use crate::domain::ProcessorSummary;

/// `GET /processors`: List registered processors.
#[utoipa::path(
    get,
    path = "/api/v1/processors",
    tag = "Processors",
    summary = "List processors",
    description = "Returns every registered processor, sorted by document type.",
    responses(
        (status = 200, description = "Registered processors", body = Vec<ProcessorSummary>),
    )
)]
pub async fn list_processors(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.document_service.registry().list().await)
}

/// Processor routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/processors", get(list_processors))
}
