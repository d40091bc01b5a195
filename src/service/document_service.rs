//! Document service: runs uploads through the vision model and the
//! registered processor, records metrics, and emits events.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{StreamExt, stream};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    BatchResult, DocumentProcessingResult, DocumentType, EventBus, ProcessingContext,
    ProcessorRegistry,
};
use crate::error::{ErrorCode, ServiceError};
use crate::insight::{ConfidenceLevel, confidence_warning, extract_confidence};
use crate::metrics::{RequestRecord, VisionMetrics};
use crate::processors::ErasedProcessor;
use crate::vision::{ImageInput, VisionModel};

/// Time budgets and limits applied by [`DocumentService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Budget for one vision model call.
    pub vision_timeout: Duration,
    /// Budget for one enrichment step.
    pub enrichment_timeout: Duration,
    /// Maximum items accepted in one batch.
    pub batch_max_items: usize,
    /// Batch items processed at once.
    pub batch_concurrency: usize,
    /// Maximum decoded image size in bytes.
    pub max_image_bytes: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            vision_timeout: Duration::from_secs(30),
            enrichment_timeout: Duration::from_secs(5),
            batch_max_items: 20,
            batch_concurrency: 4,
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ServiceOptions {
    /// Largest JSON request body worth reading: a full batch of
    /// maximum-size images after base64 expansion, plus room for metadata.
    #[must_use]
    pub const fn request_body_limit(&self) -> usize {
        const ENVELOPE_BYTES: usize = 64 * 1024;
        let encoded_image = self.max_image_bytes.saturating_mul(4).div_ceil(3);
        let items = if self.batch_max_items == 0 { 1 } else { self.batch_max_items };
        encoded_image
            .saturating_mul(items)
            .saturating_add(ENVELOPE_BYTES)
    }
}

/// One image to process.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpload {
    /// Document type the image shows.
    pub document_type: DocumentType,
    /// Base64 image data, optionally as a `data:` URI.
    pub image: String,
    /// MIME type declared by the client.
    pub mime_type: Option<String>,
    /// Uploading user, if known.
    pub user_id: Option<String>,
    /// Upload session, if known.
    pub session_id: Option<String>,
    /// Processor hints.
    pub metadata: Map<String, Value>,
}

impl DocumentUpload {
    /// Creates an upload with no identifiers or metadata.
    #[must_use]
    pub fn new(document_type: DocumentType, image: impl Into<String>) -> Self {
        Self {
            document_type,
            image: image.into(),
            mime_type: None,
            user_id: None,
            session_id: None,
            metadata: Map::new(),
        }
    }

    fn context(&self) -> ProcessingContext {
        ProcessingContext {
            document_type: self.document_type,
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Orchestration layer for document processing.
///
/// Owns references to the [`ProcessorRegistry`], the [`VisionModel`],
/// the shared [`VisionMetrics`] and the [`EventBus`]. Every upload follows
/// the pattern: decode image → look up processor → call the model under a
/// timeout → parse/validate/enrich → score confidence → record metrics →
/// emit event.
#[derive(Debug, Clone)]
pub struct DocumentService {
    registry: Arc<ProcessorRegistry>,
    vision: Arc<dyn VisionModel>,
    metrics: Arc<VisionMetrics>,
    event_bus: EventBus,
    options: ServiceOptions,
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl DocumentService {
    /// Creates a new `DocumentService`.
    #[must_use]
    pub fn new(
        registry: Arc<ProcessorRegistry>,
        vision: Arc<dyn VisionModel>,
        metrics: Arc<VisionMetrics>,
        event_bus: EventBus,
        options: ServiceOptions,
    ) -> Self {
        Self {
            registry,
            vision,
            metrics,
            event_bus,
            options,
        }
    }

    /// Returns a reference to the inner [`ProcessorRegistry`].
    #[must_use]
    pub fn registry(&self) -> &Arc<ProcessorRegistry> {
        &self.registry
    }

    /// Returns a reference to the shared [`VisionMetrics`].
    #[must_use]
    pub fn metrics(&self) -> &Arc<VisionMetrics> {
        &self.metrics
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Returns the configured limits.
    #[must_use]
    pub const fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Processes one upload.
    ///
    /// Model, parse and upstream failures come back as an `Ok` result with
    /// `success == false`; validation problems leave `success` true.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidImage`] if the image cannot be
    /// decoded and [`ServiceError::ProcessorNotFound`] if the document type
    /// has no processor. Both are still recorded in the metrics.
    pub async fn process(&self, upload: DocumentUpload) -> Result<DocumentProcessingResult, ServiceError> {
        let started = Instant::now();
        let document_type = upload.document_type;
        let prepared = self.prepare(&upload).await;
        let (processor, image) = match prepared {
            Ok(ready) => ready,
            Err(err) => {
                warn!(%document_type, error = %err, "upload rejected");
                self.metrics.record_request(&RequestRecord {
                    document_type,
                    processing_time_ms: elapsed_ms(started),
                    success: false,
                    confidence: None,
                    error_code: err.processing_code(),
                });
                return Err(err);
            }
        };

        let result = self.run(processor.as_ref(), &image, upload.context(), started).await;
        self.finish(&result);
        Ok(result)
    }

    /// Processes up to `batch_max_items` uploads, `batch_concurrency` at a
    /// time. Results keep input order; a failing item never aborts the
    /// batch.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::BatchTooLarge`] if `uploads` exceeds the
    /// configured maximum.
    pub async fn process_batch(&self, uploads: Vec<DocumentUpload>) -> Result<BatchResult, ServiceError> {
        let max = self.options.batch_max_items;
        if uploads.len() > max {
            return Err(ServiceError::BatchTooLarge {
                size: uploads.len(),
                max,
            });
        }

        let started = Instant::now();
        let size = uploads.len();
        let results: Vec<DocumentProcessingResult> = stream::iter(uploads)
            .map(|upload| self.process_item(upload))
            .buffered(self.options.batch_concurrency.max(1))
            .collect()
            .await;

        let batch = BatchResult::from_results(results, elapsed_ms(started));
        info!(
            batch_id = %batch.batch_id,
            size,
            successful = batch.successful,
            failed = batch.failed,
            "batch processed"
        );
        let listeners = self.event_bus.publish_batch(&batch);
        debug!(batch_id = %batch.batch_id, listeners, "batch announced");
        Ok(batch)
    }

    async fn process_item(&self, upload: DocumentUpload) -> DocumentProcessingResult {
        let started = Instant::now();
        let document_type = upload.document_type;
        match self.process(upload).await {
            Ok(result) => result,
            Err(err) => DocumentProcessingResult::failed(
                document_type,
                err.processing_code().unwrap_or(ErrorCode::UpstreamError),
                err.to_string(),
                Value::Null,
                String::new(),
                elapsed_ms(started),
            ),
        }
    }

    async fn prepare(
        &self,
        upload: &DocumentUpload,
    ) -> Result<(Arc<dyn ErasedProcessor>, ImageInput), ServiceError> {
        let image = ImageInput::from_base64(
            &upload.image,
            upload.mime_type.as_deref(),
            self.options.max_image_bytes,
        )?;
        let processor = self.registry.get(upload.document_type).await?;
        Ok((processor, image))
    }

    async fn run(
        &self,
        processor: &dyn ErasedProcessor,
        image: &ImageInput,
        context: ProcessingContext,
        started: Instant,
    ) -> DocumentProcessingResult {
        let document_type = context.document_type;
        let prompt = processor.prompt(&context);
        debug!(
            %document_type,
            model = self.vision.model_name(),
            mime_type = image.mime_type(),
            "sending image to vision model"
        );

        let call = tokio::time::timeout(self.options.vision_timeout, self.vision.extract(&prompt, image)).await;
        let raw_text = match call {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                warn!(%document_type, error = %err, "vision model call failed");
                return DocumentProcessingResult::failed(
                    document_type,
                    err.code(),
                    err.to_string(),
                    Value::Null,
                    String::new(),
                    elapsed_ms(started),
                );
            }
            Err(_) => {
                let err = ServiceError::UpstreamTimeout {
                    timeout_ms: u64::try_from(self.options.vision_timeout.as_millis()).unwrap_or(u64::MAX),
                };
                warn!(%document_type, error = %err, "vision model call timed out");
                return DocumentProcessingResult::failed(
                    document_type,
                    ErrorCode::UpstreamTimeout,
                    err.to_string(),
                    Value::Null,
                    String::new(),
                    elapsed_ms(started),
                );
            }
        };

        let processed = processor
            .process_text(&raw_text, &context, self.options.enrichment_timeout)
            .await;

        if !processed.usable {
            warn!(%document_type, "model reply held no usable data");
            let mut result = DocumentProcessingResult::failed(
                document_type,
                ErrorCode::ParseFailed,
                "could not extract usable data from the model reply",
                processed.data,
                raw_text,
                elapsed_ms(started),
            );
            result.validation = processed.validation;
            return result;
        }

        let confidence = extract_confidence(&json!({ "data": processed.data })).clamp(0.0, 1.0);
        let confidence_warning = confidence_warning(confidence);
        let mut validation = processed.validation;
        if let Some(message) = confidence_warning {
            validation.add_warning(message);
        }

        DocumentProcessingResult {
            id: Uuid::new_v4(),
            success: true,
            document_type,
            data: processed.data,
            validation,
            confidence,
            confidence_level: ConfidenceLevel::from_score(confidence),
            confidence_warning: confidence_warning.map(str::to_string),
            formatted: processed.formatted,
            enriched: processed.enriched,
            raw_text,
            processing_time_ms: elapsed_ms(started),
            timestamp: chrono::Utc::now(),
            error: None,
        }
    }

    fn finish(&self, result: &DocumentProcessingResult) {
        self.metrics.record_request(&RequestRecord {
            document_type: result.document_type,
            processing_time_ms: result.processing_time_ms,
            success: result.success,
            confidence: result.success.then_some(result.confidence),
            error_code: result.error_code(),
        });
        info!(
            result_id = %result.id,
            document_type = %result.document_type,
            success = result.success,
            valid = result.validation.valid,
            confidence = result.confidence,
            processing_time_ms = result.processing_time_ms,
            "document processed"
        );
        let listeners = self.event_bus.publish_result(result);
        debug!(result_id = %result.id, listeners, "result announced");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::vision::VisionError;
    use crate::vision::scripted::{ScriptedVision, image_tag, png_base64};

    const ODOMETER_REPLY: &str = r#"{"reading": 45210, "unit": "mi", "confidence": 0.92}"#;

    fn service_with(vision: ScriptedVision, options: ServiceOptions) -> DocumentService {
        DocumentService::new(
            Arc::new(ProcessorRegistry::with_default_processors(None)),
            Arc::new(vision),
            Arc::new(VisionMetrics::new()),
            EventBus::new(64),
            options,
        )
    }

    fn service(vision: ScriptedVision) -> DocumentService {
        service_with(vision, ServiceOptions::default())
    }

    #[test]
    fn body_limit_covers_a_full_batch_of_encoded_images() {
        let options = ServiceOptions {
            max_image_bytes: 3,
            batch_max_items: 2,
            ..ServiceOptions::default()
        };
        assert_eq!(options.request_body_limit(), 2 * 4 + 64 * 1024);

        let defaults = ServiceOptions::default();
        assert!(defaults.request_body_limit() > defaults.max_image_bytes * 4 / 3 * 20);
    }

    #[tokio::test]
    async fn successful_upload() {
        let svc = service(ScriptedVision::replying(ODOMETER_REPLY));
        let mut rx = svc.event_bus().subscribe();

        let upload = DocumentUpload::new(DocumentType::Odometer, png_base64(1));
        let Ok(result) = svc.process(upload).await else {
            panic!("result expected");
        };
        assert!(result.success);
        assert!(result.validation.valid);
        assert!((result.confidence - 0.92).abs() < 1e-9);
        assert_eq!(result.confidence_level, ConfidenceLevel::High);
        assert!(result.confidence_warning.is_none());
        assert_eq!(result.data["miles"], 45210.0);
        assert_eq!(result.formatted.as_deref(), Some("45,210 mi"));

        let snap = svc.metrics().snapshot();
        assert_eq!(snap.total_requests, 1);
        assert_eq!(snap.successful_requests, 1);

        let Ok(event) = rx.recv().await else {
            panic!("event expected");
        };
        assert!(event.concerns(DocumentType::Odometer));
    }

    #[tokio::test]
    async fn low_confidence_warning_lands_in_validation() {
        let svc = service(ScriptedVision::replying(
            r#"{"reading": 45210, "unit": "mi", "confidence": 0.4}"#,
        ));
        let Ok(result) = svc.process(DocumentUpload::new(DocumentType::Odometer, png_base64(1))).await else {
            panic!("result expected");
        };
        assert!(result.success);
        let Some(warning) = result.confidence_warning.as_deref() else {
            panic!("warning expected");
        };
        assert!(result.validation.warnings.iter().any(|w| w == warning));
        assert_eq!(result.confidence_level, ConfidenceLevel::Low);
    }

    #[tokio::test]
    async fn unusable_reply_fails_with_parse_failed() {
        let svc = service(ScriptedVision::replying("The image is too blurry to read."));
        let Ok(result) = svc.process(DocumentUpload::new(DocumentType::Odometer, png_base64(1))).await else {
            panic!("result expected");
        };
        assert!(!result.success);
        assert_eq!(result.error_code(), Some(ErrorCode::ParseFailed));
        assert_eq!(result.raw_text, "The image is too blurry to read.");
        assert_eq!(svc.metrics().snapshot().errors_by_code.get("PARSE_FAILED"), Some(&1));
    }

    #[tokio::test]
    async fn upstream_errors_map_to_codes() {
        let svc = service(ScriptedVision::new(|_, _| {
            Err(VisionError::RateLimited {
                retry_after_secs: Some(2),
            })
        }));
        let Ok(result) = svc.process(DocumentUpload::new(DocumentType::Vin, png_base64(1))).await else {
            panic!("result expected");
        };
        assert_eq!(result.error_code(), Some(ErrorCode::UpstreamRateLimited));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out() {
        let options = ServiceOptions {
            vision_timeout: Duration::from_millis(100),
            ..ServiceOptions::default()
        };
        let vision = ScriptedVision::replying(ODOMETER_REPLY).with_delay(Duration::from_secs(5));
        let svc = service_with(vision, options);
        let Ok(result) = svc.process(DocumentUpload::new(DocumentType::Odometer, png_base64(1))).await else {
            panic!("result expected");
        };
        assert_eq!(result.error_code(), Some(ErrorCode::UpstreamTimeout));
    }

    #[tokio::test]
    async fn rejected_uploads_are_errors_and_counted() {
        let svc = service(ScriptedVision::replying(ODOMETER_REPLY));
        let result = svc.process(DocumentUpload::new(DocumentType::Odometer, "not base64!")).await;
        assert!(matches!(result, Err(ServiceError::InvalidImage(_))));

        let Ok(_) = svc.registry().unregister(DocumentType::Vin).await else {
            panic!("vin processor expected");
        };
        let result = svc.process(DocumentUpload::new(DocumentType::Vin, png_base64(1))).await;
        assert!(matches!(result, Err(ServiceError::ProcessorNotFound(DocumentType::Vin))));

        let snap = svc.metrics().snapshot();
        assert_eq!(snap.failed_requests, 2);
        assert_eq!(snap.errors_by_code.get("INVALID_IMAGE"), Some(&1));
        assert_eq!(snap.errors_by_code.get("UNSUPPORTED_DOCUMENT_TYPE"), Some(&1));
    }

    #[tokio::test]
    async fn batch_item_failure_is_isolated() {
        let vision = ScriptedVision::new(|_, image| match image_tag(image) {
            Some(3) => Ok("no odometer visible".to_string()),
            Some(tag) => Ok(format!(r#"{{"reading": {}, "unit": "mi", "confidence": 0.9}}"#, 1000 * u32::from(tag))),
            None => Err(VisionError::EmptyReply),
        });
        let svc = service(vision);
        let mut rx = svc.event_bus().subscribe();
        let uploads = (1..=5)
            .map(|tag| DocumentUpload::new(DocumentType::Odometer, png_base64(tag)))
            .collect();

        let Ok(batch) = svc.process_batch(uploads).await else {
            panic!("batch expected");
        };
        assert_eq!(batch.total, 5);
        assert_eq!(batch.successful, 4);
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.successful + batch.failed, batch.total);

        let Some(third) = batch.results.get(2) else {
            panic!("third result expected");
        };
        assert!(!third.success);
        assert_eq!(third.error_code(), Some(ErrorCode::ParseFailed));
        let Some(fifth) = batch.results.get(4) else {
            panic!("fifth result expected");
        };
        assert_eq!(fifth.data["miles"], 5000.0);

        assert!((batch.statistics.average_confidence - 0.9).abs() < 1e-9);
        let success_time: u64 = batch.results.iter().filter(|r| r.success).map(|r| r.processing_time_ms).sum();
        assert_eq!(batch.statistics.total_processing_time_ms, success_time);

        let mut saw_batch_event = false;
        while let Ok(event) = rx.try_recv() {
            saw_batch_event |= event.event_type_str() == "batch_completed";
        }
        assert!(saw_batch_event);
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected() {
        let options = ServiceOptions {
            batch_max_items: 2,
            ..ServiceOptions::default()
        };
        let svc = service_with(ScriptedVision::replying(ODOMETER_REPLY), options);
        let uploads = (0..3)
            .map(|tag| DocumentUpload::new(DocumentType::Odometer, png_base64(tag)))
            .collect();
        let result = svc.process_batch(uploads).await;
        assert!(matches!(result, Err(ServiceError::BatchTooLarge { size: 3, max: 2 })));
    }

    #[tokio::test]
    async fn batch_isolates_invalid_images() {
        let svc = service(ScriptedVision::replying(ODOMETER_REPLY));
        let uploads = vec![
            DocumentUpload::new(DocumentType::Odometer, png_base64(1)),
            DocumentUpload::new(DocumentType::Odometer, ""),
        ];
        let Ok(batch) = svc.process_batch(uploads).await else {
            panic!("batch expected");
        };
        assert_eq!(batch.successful, 1);
        let Some(second) = batch.results.get(1) else {
            panic!("second result expected");
        };
        assert_eq!(second.error_code(), Some(ErrorCode::InvalidImage));
    }
}
