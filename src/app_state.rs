//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventBus;
use crate::metrics::VisionMetrics;
use crate::service::DocumentService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Document service for all processing logic.
    pub document_service: Arc<DocumentService>,
    /// Process-wide vision metrics.
    pub metrics: Arc<VisionMetrics>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
}

impl AppState {
    /// Builds the state around `service`, sharing its metrics and bus.
    #[must_use]
    pub fn new(document_service: Arc<DocumentService>) -> Self {
        let metrics = Arc::clone(document_service.metrics());
        let event_bus = document_service.event_bus().clone();
        Self {
            document_service,
            metrics,
            event_bus,
        }
    }
}
