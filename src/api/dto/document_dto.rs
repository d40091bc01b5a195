//! Document processing DTOs: single upload, batch, result → event.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{DocumentProcessingResult, DocumentType};
use crate::error::ServiceError;
use crate::service::DocumentUpload;

/// Request body for `POST /documents/process`, and one batch item.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProcessDocumentRequest {
    /// Document type tag (e.g. `"fuel_receipt"`).
    pub document_type: String,
    /// Base64 image data; a `data:` URI is accepted.
    pub image: String,
    /// Declared MIME type, used only when the format cannot be sniffed.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Uploading user.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Upload session.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Processor hints (`last_odometer_miles`, `fuel_gauge_reference`, `vehicle`).
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Map<String, Value>,
}

/// Only the document type is checked here; image problems are reported by
/// the service so a bad image fails its own batch item.
impl TryFrom<ProcessDocumentRequest> for DocumentUpload {
    type Error = ServiceError;

    fn try_from(req: ProcessDocumentRequest) -> Result<Self, Self::Error> {
        let document_type: DocumentType = req.document_type.parse()?;
        Ok(Self {
            document_type,
            image: req.image,
            mime_type: req.mime_type,
            user_id: req.user_id,
            session_id: req.session_id,
            metadata: req.metadata,
        })
    }
}

/// Request body for `POST /documents/batch`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BatchProcessRequest {
    /// Uploads to process, in order.
    pub items: Vec<ProcessDocumentRequest>,
}

/// Request body for `POST /documents/to-event`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ResultToEventRequest {
    /// A successful processing result the user confirmed.
    pub result: DocumentProcessingResult,
    /// Vehicle the event belongs to.
    pub vehicle_id: Uuid,
    /// Date used when the document carries none; defaults to today.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// Catalog entry for `GET /config/document-types`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DocumentTypeInfo {
    /// Wire tag.
    pub document_type: DocumentType,
    /// Human description.
    pub description: &'static str,
    /// Event type a confirmed result becomes.
    pub event_type: String,
    /// Whether a processor is currently registered.
    pub registered: bool,
}
