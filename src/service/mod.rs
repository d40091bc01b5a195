//! Service layer: business logic orchestration.
//!
//! [`DocumentService`] coordinates uploads across the vision model and the
//! processor registry, records metrics, and emits events through the
//! [`super::domain::EventBus`].

pub mod document_service;

pub use document_service::{DocumentService, DocumentUpload, ServiceOptions};
