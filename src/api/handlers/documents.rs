//! Document handlers: process one upload, process a batch, confirm a
//! result as an event.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::{BatchProcessRequest, ProcessDocumentRequest, ResultToEventRequest};
use crate::app_state::AppState;
use crate::domain::{BatchResult, DocumentProcessingResult, Event};
use crate::error::{ErrorResponse, ServiceError};
use crate::service::DocumentUpload;

/// `POST /documents/process`: Extract structured data from one image.
///
/// # Errors
///
/// Returns [`ServiceError`] on malformed input, an unknown document type,
/// or an undecodable image. Model and parse failures are reported in the
/// result body with `success: false`.
#[utoipa::path(
    post,
    path = "/api/v1/documents/process",
    tag = "Documents",
    summary = "Process one document image",
    description = "Runs the image through the vision model and the document type's processor. Returns 200 with `success: false` when extraction fails.",
    request_body = ProcessDocumentRequest,
    responses(
        (status = 200, description = "Processing result", body = DocumentProcessingResult),
        (status = 400, description = "Invalid request, image, or document type", body = ErrorResponse),
        (status = 404, description = "No processor registered", body = ErrorResponse),
    )
)]
pub async fn process_document(
    State(state): State<AppState>,
    Json(req): Json<ProcessDocumentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let upload = DocumentUpload::try_from(req)?;
    let result = state.document_service.process(upload).await?;
    Ok(Json(result))
}

/// `POST /documents/batch`: Process several images concurrently.
///
/// # Errors
///
/// Returns [`ServiceError`] if any item names an unknown document type or
/// the batch exceeds the configured maximum. Bad images fail their own
/// item.
#[utoipa::path(
    post,
    path = "/api/v1/documents/batch",
    tag = "Documents",
    summary = "Process a batch of document images",
    description = "Processes every item with its own timeout. Results keep input order and a failing item never aborts the batch.",
    request_body = BatchProcessRequest,
    responses(
        (status = 200, description = "Batch report", body = BatchResult),
        (status = 400, description = "Unknown document type in an item", body = ErrorResponse),
        (status = 413, description = "Too many items", body = ErrorResponse),
    )
)]
pub async fn process_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchProcessRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let uploads = req
        .items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            DocumentUpload::try_from(item).map_err(|err| match err {
                ServiceError::UnsupportedDocumentType(t) => {
                    ServiceError::UnsupportedDocumentType(format!("{t} (item {index})"))
                }
                other => other,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let batch = state.document_service.process_batch(uploads).await?;
    Ok(Json(batch))
}

/// `POST /documents/to-event`: Turn a confirmed result into an event.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidRequest`] for failed results.
#[utoipa::path(
    post,
    path = "/api/v1/documents/to-event",
    tag = "Documents",
    summary = "Build an event from a processing result",
    description = "Maps a successful result to the vehicle event it represents, ready for persistence.",
    request_body = ResultToEventRequest,
    responses(
        (status = 201, description = "Event built", body = Event),
        (status = 400, description = "Result cannot become an event", body = ErrorResponse),
    )
)]
pub async fn result_to_event(Json(req): Json<ResultToEventRequest>) -> Result<impl IntoResponse, ServiceError> {
    let fallback = req.date.unwrap_or_else(|| Utc::now().date_naive());
    let event = req.result.to_event(req.vehicle_id, fallback)?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Document routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/documents/process", post(process_document))
        .route("/documents/batch", post(process_batch))
        .route("/documents/to-event", post(result_to_event))
}
