//! Processing inputs and outputs: context, validation, results, batches.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{DocumentType, Event, EventType};
use super::event::EXTRACTED_DATA_KEY;
use crate::error::{ErrorCode, ServiceError};
use crate::insight::ConfidenceLevel;
use crate::insight::lookup;

/// Caller context handed to every processor operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProcessingContext {
    /// Document type being processed.
    pub document_type: DocumentType,
    /// Uploading user, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Upload session, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Free-form hints (previous odometer, gauge reference, vehicle).
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Map<String, Value>,
}

impl ProcessingContext {
    /// Creates a context with no identifiers and empty metadata.
    #[must_use]
    pub fn new(document_type: DocumentType) -> Self {
        Self {
            document_type,
            user_id: None,
            session_id: None,
            metadata: Map::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Reads a numeric metadata hint (numbers or numeric strings).
    #[must_use]
    pub fn metadata_number(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(lookup::as_number)
    }

    /// Reads a non-blank text metadata hint.
    #[must_use]
    pub fn metadata_text(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Outcome of validating structured data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ValidationResult {
    /// `false` when at least one error was found.
    pub valid: bool,
    /// Blocking problems.
    pub errors: Vec<String>,
    /// Non-blocking observations.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::ok()
    }
}

impl ValidationResult {
    /// A passing result with no findings.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Records an error and marks the result invalid.
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(message.into());
    }

    /// Records a warning.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Why a result failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProcessingFailure {
    /// Failure category.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

/// Output of running one image through a document processor.
///
/// `success == false` always comes with `error`; `data` may then be
/// partial or empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DocumentProcessingResult {
    /// Result identifier.
    pub id: Uuid,
    /// Whether the pipeline produced usable data.
    pub success: bool,
    /// Document type processed.
    pub document_type: DocumentType,
    /// Structured (possibly enriched) data.
    #[schema(value_type = Object)]
    pub data: Value,
    /// Validation outcome.
    pub validation: ValidationResult,
    /// Confidence score in `[0, 1]`.
    pub confidence: f64,
    /// Confidence bucket.
    pub confidence_level: ConfidenceLevel,
    /// Warning text for low-confidence results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_warning: Option<String>,
    /// Display rendering from the processor, if it formats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
    /// Whether enrichment was applied.
    #[serde(default)]
    pub enriched: bool,
    /// Raw model reply.
    pub raw_text: String,
    /// Time spent processing, in milliseconds.
    pub processing_time_ms: u64,
    /// Completion timestamp.
    pub timestamp: DateTime<Utc>,
    /// Failure detail when `success` is `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProcessingFailure>,
}

impl DocumentProcessingResult {
    /// Builds a failed result.
    #[must_use]
    pub fn failed(
        document_type: DocumentType,
        code: ErrorCode,
        message: impl Into<String>,
        data: Value,
        raw_text: String,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            success: false,
            document_type,
            data,
            validation: ValidationResult::ok(),
            confidence: 0.0,
            confidence_level: ConfidenceLevel::Low,
            confidence_warning: None,
            formatted: None,
            enriched: false,
            raw_text,
            processing_time_ms,
            timestamp: Utc::now(),
            error: Some(ProcessingFailure {
                code,
                message: message.into(),
            }),
        }
    }

    /// Returns the failure code, if any.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }

    /// Event type a confirmed result of this document type becomes.
    #[must_use]
    pub const fn event_type_for(document_type: DocumentType) -> EventType {
        match document_type {
            DocumentType::FuelReceipt => EventType::Fuel,
            DocumentType::ServiceInvoice => EventType::Service,
            DocumentType::Odometer => EventType::Odometer,
            DocumentType::DashboardSnapshot => EventType::DashboardSnapshot,
            DocumentType::Vin => EventType::Document,
        }
    }

    /// Builds the event a user confirms from this result.
    ///
    /// Dashboard snapshots keep the vision layout (`data.*`); other types
    /// write fields at the top level with an `extracted_data` mirror and a
    /// top-level `confidence`. The event date comes from the document's
    /// `date` field when it parses, else `fallback_date`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for failed results or
    /// results whose data is not a JSON object.
    pub fn to_event(&self, vehicle_id: Uuid, fallback_date: NaiveDate) -> Result<Event, ServiceError> {
        if !self.success {
            return Err(ServiceError::InvalidRequest(
                "cannot build an event from a failed result".to_string(),
            ));
        }
        let Some(fields) = self.data.as_object() else {
            return Err(ServiceError::InvalidRequest(
                "result data is not an object".to_string(),
            ));
        };

        let mut payload = Map::new();
        if self.document_type == DocumentType::DashboardSnapshot {
            payload.insert("data".to_string(), self.data.clone());
        } else {
            payload.extend(fields.clone());
            payload.insert("confidence".to_string(), Value::from(self.confidence));
            payload.insert(EXTRACTED_DATA_KEY.to_string(), self.data.clone());
        }
        payload.insert("document_result_id".to_string(), Value::from(self.id.to_string()));
        let payload = Value::Object(payload);

        let date = fields
            .get("date")
            .and_then(Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .unwrap_or(fallback_date);

        let mut event = Event::new(
            vehicle_id,
            Self::event_type_for(self.document_type),
            date,
            payload,
        );
        event.miles = lookup::miles(&event.payload);
        event.total_amount = lookup::amount(&event.payload);
        event.gallons = lookup::gallons(&event.payload);
        Ok(event)
    }
}

/// Aggregates over the successful items of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchStatistics {
    /// Mean confidence of successful items (0 when none succeeded).
    pub average_confidence: f64,
    /// Mean processing time of successful items, in milliseconds.
    pub average_processing_time_ms: f64,
    /// Summed processing time of successful items, in milliseconds.
    pub total_processing_time_ms: u64,
}

/// Report for a batch of independently processed documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchResult {
    /// Batch identifier.
    pub batch_id: Uuid,
    /// Number of items submitted.
    pub total: usize,
    /// Items with `success == true`.
    pub successful: usize,
    /// Items with `success == false`.
    pub failed: usize,
    /// Per-item results, in submission order.
    pub results: Vec<DocumentProcessingResult>,
    /// Aggregates over successful items.
    pub statistics: BatchStatistics,
    /// Wall-clock duration of the whole batch, in milliseconds.
    pub wall_clock_ms: u64,
}

impl BatchResult {
    /// Builds the report from per-item results.
    #[must_use]
    pub fn from_results(results: Vec<DocumentProcessingResult>, wall_clock_ms: u64) -> Self {
        let successes: Vec<&DocumentProcessingResult> =
            results.iter().filter(|r| r.success).collect();
        let successful = successes.len();

        let statistics = if successful == 0 {
            BatchStatistics::default()
        } else {
            let total_time: u64 = successes.iter().map(|r| r.processing_time_ms).sum();
            let confidence_sum: f64 = successes.iter().map(|r| r.confidence).sum();
            #[allow(clippy::cast_precision_loss)]
            let n = successful as f64;
            #[allow(clippy::cast_precision_loss)]
            let average_processing_time_ms = total_time as f64 / n;
            BatchStatistics {
                average_confidence: confidence_sum / n,
                average_processing_time_ms,
                total_processing_time_ms: total_time,
            }
        };

        Self {
            batch_id: Uuid::new_v4(),
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
            statistics,
            wall_clock_ms,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn success(document_type: DocumentType, data: Value, confidence: f64, ms: u64) -> DocumentProcessingResult {
        DocumentProcessingResult {
            id: Uuid::new_v4(),
            success: true,
            document_type,
            data,
            validation: ValidationResult::ok(),
            confidence,
            confidence_level: ConfidenceLevel::from_score(confidence),
            confidence_warning: None,
            formatted: None,
            enriched: false,
            raw_text: String::new(),
            processing_time_ms: ms,
            timestamp: Utc::now(),
            error: None,
        }
    }

    fn fallback() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default()
    }

    #[test]
    fn validation_result_tracks_errors() {
        let mut v = ValidationResult::ok();
        v.add_warning("odd total");
        assert!(v.valid);
        v.add_error("negative gallons");
        assert!(!v.valid);
        assert_eq!(v.errors.len(), 1);
        assert_eq!(v.warnings.len(), 1);
    }

    #[test]
    fn failed_result_always_has_error() {
        let r = DocumentProcessingResult::failed(
            DocumentType::Odometer,
            ErrorCode::ParseFailed,
            "no reading",
            json!({}),
            "???".to_string(),
            12,
        );
        assert!(!r.success);
        assert_eq!(r.error_code(), Some(ErrorCode::ParseFailed));
    }

    #[test]
    fn fuel_result_becomes_legacy_layout_event() {
        let data = json!({"vendor_name": "Shell", "gallons": 10.0, "total_amount": 34.59, "date": "2025-02-03"});
        let result = success(DocumentType::FuelReceipt, data, 0.9, 100);
        let Ok(event) = result.to_event(Uuid::new_v4(), fallback()) else {
            panic!("event expected");
        };
        assert_eq!(event.event_type, EventType::Fuel);
        assert_eq!(event.date.to_string(), "2025-02-03");
        assert_eq!(event.payload["extracted_data"]["vendor_name"], json!("Shell"));
        assert_eq!(event.payload["confidence"], json!(0.9));
        assert_eq!(event.gallons, Some(10.0));
        assert_eq!(event.total_amount, Some(34.59));
    }

    #[test]
    fn dashboard_result_uses_data_layout() {
        let data = json!({"odometer_miles": 1200, "validation": {"rollup": "ok"}});
        let result = success(DocumentType::DashboardSnapshot, data, 0.8, 100);
        let Ok(event) = result.to_event(Uuid::new_v4(), fallback()) else {
            panic!("event expected");
        };
        assert_eq!(event.date, fallback());
        assert_eq!(event.payload["data"]["validation"]["rollup"], json!("ok"));
        assert!(event.payload.get("confidence").is_none());
        assert_eq!(event.miles, Some(1200.0));
    }

    #[test]
    fn failed_result_cannot_become_event() {
        let r = DocumentProcessingResult::failed(
            DocumentType::Vin,
            ErrorCode::UpstreamTimeout,
            "timeout",
            Value::Null,
            String::new(),
            0,
        );
        assert!(r.to_event(Uuid::new_v4(), fallback()).is_err());
    }

    #[test]
    fn batch_statistics_only_count_successes() {
        let results = vec![
            success(DocumentType::Odometer, json!({}), 0.9, 100),
            DocumentProcessingResult::failed(
                DocumentType::Odometer,
                ErrorCode::ParseFailed,
                "bad",
                json!({}),
                String::new(),
                5_000,
            ),
            success(DocumentType::Odometer, json!({}), 0.7, 300),
        ];
        let batch = BatchResult::from_results(results, 400);
        assert_eq!(batch.total, 3);
        assert_eq!(batch.successful, 2);
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.statistics.total_processing_time_ms, 400);
        assert!((batch.statistics.average_processing_time_ms - 200.0).abs() < 1e-9);
        assert!((batch.statistics.average_confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn empty_batch_has_zero_statistics() {
        let batch = BatchResult::from_results(Vec::new(), 0);
        assert_eq!(batch.total, 0);
        assert_eq!(batch.statistics, BatchStatistics::default());
    }

    #[test]
    fn context_metadata_helpers() {
        let ctx = ProcessingContext::new(DocumentType::Odometer)
            .with_metadata("last_odometer_miles", "45,000")
            .with_metadata("vehicle", "  ");
        assert_eq!(ctx.metadata_number("last_odometer_miles"), Some(45000.0));
        assert_eq!(ctx.metadata_text("vehicle"), None);
    }
}
