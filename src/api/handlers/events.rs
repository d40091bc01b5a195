//! Event handlers: display insights and edits.

use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{EditEventRequest, EditEventResponse};
use crate::app_state::AppState;
use crate::domain::Event;
use crate::error::{ErrorResponse, ServiceError};
use crate::insight::EventInsight;

/// `POST /events/insights`: Summary, vendor and confidence for an event.
#[utoipa::path(
    post,
    path = "/api/v1/events/insights",
    tag = "Events",
    summary = "Interpret an event payload",
    description = "Returns the one-line summary, normalized vendor, confidence score, level, and any warning the user must see.",
    request_body = Event,
    responses(
        (status = 200, description = "Event insight", body = EventInsight),
    )
)]
pub async fn event_insights(Json(event): Json<Event>) -> impl IntoResponse {
    Json(EventInsight::of(&event))
}

/// `POST /events/edit`: Apply an edit and append it to the history.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidRequest`] if a value does not fit its
/// field.
#[utoipa::path(
    post,
    path = "/api/v1/events/edit",
    tag = "Events",
    summary = "Edit an event",
    description = "Applies field changes, recording only fields whose value changed. Returns the updated event and the committed edit record.",
    request_body = EditEventRequest,
    responses(
        (status = 200, description = "Edited event", body = EditEventResponse),
        (status = 400, description = "Invalid change", body = ErrorResponse),
    )
)]
pub async fn edit_event(Json(req): Json<EditEventRequest>) -> Result<impl IntoResponse, ServiceError> {
    let EditEventRequest {
        mut event,
        changes,
        edited_by,
        reason,
    } = req;
    let edit = event.apply_edit(&changes, edited_by, reason)?.cloned();
    Ok(Json(EditEventResponse { event, edit }))
}

/// Event routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events/insights", post(event_insights))
        .route("/events/edit", post(edit_event))
}
