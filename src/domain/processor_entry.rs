//! Registry entry combining a processor with registration metadata.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::DocumentType;
use crate::processors::ErasedProcessor;

/// A registered processor and when it was registered.
#[derive(Debug, Clone)]
pub struct ProcessorEntry {
    /// The processor, shared with in-flight requests.
    pub processor: Arc<dyn ErasedProcessor>,

    /// Registration timestamp.
    pub registered_at: DateTime<Utc>,
}

impl ProcessorEntry {
    /// Wraps `processor`, stamping the registration time.
    #[must_use]
    pub fn new(processor: Arc<dyn ErasedProcessor>) -> Self {
        Self {
            processor,
            registered_at: Utc::now(),
        }
    }

    /// Document type the processor handles.
    #[must_use]
    pub fn document_type(&self) -> DocumentType {
        self.processor.document_type()
    }
}

/// Lightweight summary of a processor for list endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ProcessorSummary {
    /// Document type handled.
    pub document_type: DocumentType,
    /// Processor version string.
    pub version: String,
    /// Whether the processor runs an enrichment step.
    pub supports_enrichment: bool,
    /// Human description of the document type.
    pub description: String,
    /// Registration timestamp.
    pub registered_at: DateTime<Utc>,
}

impl From<&ProcessorEntry> for ProcessorSummary {
    fn from(entry: &ProcessorEntry) -> Self {
        let document_type = entry.document_type();
        Self {
            document_type,
            version: entry.processor.version().to_string(),
            supports_enrichment: entry.processor.supports_enrichment(),
            description: document_type.description().to_string(),
            registered_at: entry.registered_at,
        }
    }
}
