//! REST API layer: route handlers, DTOs, router composition, and the
//! OpenAPI document.
//!
//! Resource endpoints are mounted under `/api/v1`; health and catalog
//! endpoints sit at the root.

pub mod dto;
pub mod handlers;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::service::ServiceOptions;

/// OpenAPI description of every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "vehicle-vision",
        description = "Document vision pipeline for vehicle maintenance tracking"
    ),
    paths(
        handlers::documents::process_document,
        handlers::documents::process_batch,
        handlers::documents::result_to_event,
        handlers::events::event_insights,
        handlers::events::edit_event,
        handlers::metrics::get_metrics,
        handlers::metrics::record_accuracy,
        handlers::metrics::reset_metrics,
        handlers::processors::list_processors,
        handlers::system::health_handler,
        handlers::system::document_types_handler,
    ),
    tags(
        (name = "Documents", description = "Image processing"),
        (name = "Events", description = "Event interpretation and edits"),
        (name = "Metrics", description = "Vision pipeline metrics"),
        (name = "Processors", description = "Processor registry"),
        (name = "System", description = "Health and catalog"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
///
/// Request bodies may carry a full batch of base64 images, so the body
/// limit follows `options` instead of axum's 2 MB default.
pub fn build_router(options: &ServiceOptions) -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
        .layer(DefaultBodyLimit::max(options.request_body_limit()))
}
