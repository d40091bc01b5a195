//! Events published after documents are processed.
//!
//! Every processed upload and every finished batch emits a
//! [`ProcessingEvent`] through the [`super::EventBus`]. Events are
//! broadcast to WebSocket subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{BatchResult, DocumentProcessingResult, DocumentType};
use crate::error::ErrorCode;
use crate::insight::ConfidenceLevel;

/// Outcome notification for the live feed.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ProcessingEvent {
    /// Emitted after one document finishes processing.
    DocumentProcessed {
        /// Result identifier.
        result_id: Uuid,
        /// Document type processed.
        document_type: DocumentType,
        /// Whether extraction succeeded.
        success: bool,
        /// Whether the extracted data passed validation.
        valid: bool,
        /// Result confidence.
        confidence: f64,
        /// Confidence band.
        confidence_level: ConfidenceLevel,
        /// Failure category, when unsuccessful.
        #[serde(skip_serializing_if = "Option::is_none")]
        error_code: Option<ErrorCode>,
        /// One-line rendering of the data, when available.
        #[serde(skip_serializing_if = "Option::is_none")]
        formatted: Option<String>,
        /// Processing time in milliseconds.
        processing_time_ms: u64,
        /// Completion timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after a batch finishes.
    BatchCompleted {
        /// Batch identifier.
        batch_id: Uuid,
        /// Distinct document types in the batch.
        document_types: Vec<DocumentType>,
        /// Items submitted.
        total: usize,
        /// Items that succeeded.
        successful: usize,
        /// Items that failed.
        failed: usize,
        /// Completion timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl ProcessingEvent {
    /// Builds the event for a single result.
    #[must_use]
    pub fn document_processed(result: &DocumentProcessingResult) -> Self {
        Self::DocumentProcessed {
            result_id: result.id,
            document_type: result.document_type,
            success: result.success,
            valid: result.validation.valid,
            confidence: result.confidence,
            confidence_level: result.confidence_level,
            error_code: result.error_code(),
            formatted: result.formatted.clone(),
            processing_time_ms: result.processing_time_ms,
            timestamp: result.timestamp,
        }
    }

    /// Builds the event for a finished batch.
    #[must_use]
    pub fn batch_completed(batch: &BatchResult) -> Self {
        let mut document_types: Vec<DocumentType> =
            batch.results.iter().map(|r| r.document_type).collect();
        document_types.sort();
        document_types.dedup();
        Self::BatchCompleted {
            batch_id: batch.batch_id,
            document_types,
            total: batch.total,
            successful: batch.successful,
            failed: batch.failed,
            timestamp: Utc::now(),
        }
    }

    /// Returns `true` if the event concerns `document_type`.
    #[must_use]
    pub fn concerns(&self, document_type: DocumentType) -> bool {
        match self {
            Self::DocumentProcessed {
                document_type: t, ..
            } => *t == document_type,
            Self::BatchCompleted { document_types, .. } => document_types.contains(&document_type),
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::DocumentProcessed { .. } => "document_processed",
            Self::BatchCompleted { .. } => "batch_completed",
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn failed(document_type: DocumentType) -> DocumentProcessingResult {
        DocumentProcessingResult::failed(
            document_type,
            ErrorCode::ParseFailed,
            "no usable data",
            serde_json::Value::Null,
            String::new(),
            12,
        )
    }

    #[test]
    fn document_event_carries_outcome() {
        let event = ProcessingEvent::document_processed(&failed(DocumentType::Odometer));
        assert_eq!(event.event_type_str(), "document_processed");
        assert!(event.concerns(DocumentType::Odometer));
        assert!(!event.concerns(DocumentType::Vin));

        let Ok(json) = serde_json::to_value(&event) else {
            panic!("event must serialize");
        };
        assert_eq!(json["event_type"], "document_processed");
        assert_eq!(json["error_code"], "PARSE_FAILED");
        assert_eq!(json["document_type"], "odometer");
        assert!(json.get("formatted").is_none());
    }

    #[test]
    fn batch_event_lists_distinct_types() {
        let batch = BatchResult::from_results(
            vec![
                failed(DocumentType::Vin),
                failed(DocumentType::FuelReceipt),
                failed(DocumentType::Vin),
            ],
            40,
        );
        let event = ProcessingEvent::batch_completed(&batch);
        let ProcessingEvent::BatchCompleted {
            document_types,
            total,
            failed,
            ..
        } = &event
        else {
            panic!("batch event expected");
        };
        assert_eq!(document_types, &vec![DocumentType::FuelReceipt, DocumentType::Vin]);
        assert_eq!((*total, *failed), (3, 3));
        assert!(event.concerns(DocumentType::Vin));
        assert!(!event.concerns(DocumentType::Odometer));
    }
}
