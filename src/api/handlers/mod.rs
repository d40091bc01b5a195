//! REST endpoint handlers organized by resource.

pub mod documents;
pub mod events;
pub mod metrics;
pub mod processors;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(documents::routes())
        .merge(events::routes())
        .merge(metrics::routes())
        .merge(processors::routes())
}
