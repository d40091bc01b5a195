//! Vision pipeline metrics: request counters, accuracy, calibration.
//!
//! [`VisionMetrics`] is created once at start-up and shared by `Arc`.
//! Global counters are plain atomics; per-type, per-error and accuracy
//! tallies sit behind one short mutex section per call, so concurrent
//! upload handlers never lose updates.

pub mod health;
pub mod snapshot;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

pub use health::{HealthAssessment, HealthStatus, assess_health, classify_health};
pub use snapshot::{DocumentTypeStats, FieldAccuracy, MetricsSnapshot};

use crate::domain::DocumentType;
use crate::error::ErrorCode;

/// Number of calibration buckets over `[0, 1]`.
pub const CALIBRATION_BUCKETS: usize = 10;

/// Confidence sums are kept in millionths so they fit an atomic integer.
const CONFIDENCE_SCALE: f64 = 1_000_000.0;

/// One processed upload.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    /// Document type processed.
    pub document_type: DocumentType,
    /// Wall time spent, in milliseconds.
    pub processing_time_ms: u64,
    /// Whether the result was successful.
    pub success: bool,
    /// Confidence of the result, when one was computed.
    pub confidence: Option<f64>,
    /// Failure category of an unsuccessful result.
    pub error_code: Option<ErrorCode>,
}

/// Ground truth for one reviewed result.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct AccuracyRecord {
    /// Document type reviewed.
    pub document_type: DocumentType,
    /// Field name to whether the extracted value was correct. Names outside
    /// [`DocumentType::reviewable_fields`] are ignored.
    pub field_accuracies: BTreeMap<String, bool>,
    /// Confidence the pipeline reported for the result.
    pub predicted_confidence: f64,
}

#[derive(Debug, Default)]
struct TypeTally {
    requests: u64,
    successes: u64,
    processing_ms: u64,
    confidence_sum: f64,
    confidence_samples: u64,
    fields_correct: u64,
    fields_total: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct CalibrationBucket {
    samples: u64,
    predicted_sum: f64,
    observed_sum: f64,
}

#[derive(Debug)]
struct Tallies {
    by_type: HashMap<DocumentType, TypeTally>,
    errors: HashMap<ErrorCode, u64>,
    fields: HashMap<(DocumentType, &'static str), (u64, u64)>,
    fields_correct: u64,
    fields_total: u64,
    accuracy_samples: u64,
    calibration: [CalibrationBucket; CALIBRATION_BUCKETS],
    collected_since: DateTime<Utc>,
}

impl Tallies {
    fn new() -> Self {
        Self {
            by_type: HashMap::new(),
            errors: HashMap::new(),
            fields: HashMap::new(),
            fields_correct: 0,
            fields_total: 0,
            accuracy_samples: 0,
            calibration: [CalibrationBucket::default(); CALIBRATION_BUCKETS],
            collected_since: Utc::now(),
        }
    }
}

/// Process-wide vision metrics.
#[derive(Debug)]
pub struct VisionMetrics {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    processing_ms_sum: AtomicU64,
    confidence_sum_micros: AtomicU64,
    confidence_samples: AtomicU64,
    tallies: Mutex<Tallies>,
}

impl Default for VisionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket_index(confidence: f64) -> usize {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = (confidence.clamp(0.0, 1.0) * CALIBRATION_BUCKETS as f64).floor() as usize;
    index.min(CALIBRATION_BUCKETS - 1)
}

impl VisionMetrics {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            processing_ms_sum: AtomicU64::new(0),
            confidence_sum_micros: AtomicU64::new(0),
            confidence_samples: AtomicU64::new(0),
            tallies: Mutex::new(Tallies::new()),
        }
    }

    fn tallies(&self) -> MutexGuard<'_, Tallies> {
        // Tallies stay internally consistent even if a holder panicked.
        self.tallies.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Records one processed upload.
    pub fn record_request(&self, record: &RequestRecord) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if record.success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.processing_ms_sum
            .fetch_add(record.processing_time_ms, Ordering::Relaxed);
        let confidence = record.confidence.map(|c| c.clamp(0.0, 1.0));
        if let Some(c) = confidence {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let micros = (c * CONFIDENCE_SCALE).round() as u64;
            self.confidence_sum_micros.fetch_add(micros, Ordering::Relaxed);
            self.confidence_samples.fetch_add(1, Ordering::Relaxed);
        }

        let mut tallies = self.tallies();
        let tally = tallies.by_type.entry(record.document_type).or_default();
        tally.requests += 1;
        if record.success {
            tally.successes += 1;
        }
        tally.processing_ms += record.processing_time_ms;
        if let Some(c) = confidence {
            tally.confidence_sum += c;
            tally.confidence_samples += 1;
        }
        if let Some(code) = record.error_code {
            *tallies.errors.entry(code).or_insert(0) += 1;
        }
    }

    /// Records reviewed ground truth for the document type's reviewable
    /// fields. A record with none of them is ignored.
    pub fn record_accuracy(&self, record: &AccuracyRecord) {
        let reviewed: Vec<(&'static str, bool)> = record
            .document_type
            .reviewable_fields()
            .iter()
            .filter_map(|field| record.field_accuracies.get(*field).map(|ok| (*field, *ok)))
            .collect();
        let total = reviewed.len() as u64;
        if total == 0 {
            return;
        }
        let correct = reviewed.iter().filter(|(_, ok)| *ok).count() as u64;
        #[allow(clippy::cast_precision_loss)]
        let observed = correct as f64 / total as f64;
        let predicted = record.predicted_confidence.clamp(0.0, 1.0);

        let mut tallies = self.tallies();
        tallies.accuracy_samples += 1;
        tallies.fields_correct += correct;
        tallies.fields_total += total;
        for (field, ok) in reviewed {
            let entry = tallies.fields.entry((record.document_type, field)).or_insert((0, 0));
            entry.1 += 1;
            if ok {
                entry.0 += 1;
            }
        }
        let tally = tallies.by_type.entry(record.document_type).or_default();
        tally.fields_correct += correct;
        tally.fields_total += total;
        if let Some(bucket) = tallies.calibration.get_mut(bucket_index(predicted)) {
            bucket.samples += 1;
            bucket.predicted_sum += predicted;
            bucket.observed_sum += observed;
        }
    }

    /// Point-in-time view of every aggregate. Work is bounded by the fixed
    /// set of document types, error codes and reviewable fields.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_requests.load(Ordering::Relaxed);
        let successful = self.successful_requests.load(Ordering::Relaxed).min(total);
        let processing_ms = self.processing_ms_sum.load(Ordering::Relaxed);
        let confidence_micros = self.confidence_sum_micros.load(Ordering::Relaxed);
        let confidence_samples = self.confidence_samples.load(Ordering::Relaxed);
        #[allow(clippy::cast_precision_loss)]
        let confidence_sum = confidence_micros as f64 / CONFIDENCE_SCALE;
        let tallies = self.tallies();
        snapshot::build(
            snapshot::Counters {
                total,
                successful,
                processing_ms,
                confidence_sum,
                confidence_samples,
            },
            &tallies,
        )
    }

    /// Clears every counter and restarts `collected_since`.
    pub fn reset(&self) {
        let mut tallies = self.tallies();
        self.total_requests.store(0, Ordering::Relaxed);
        self.successful_requests.store(0, Ordering::Relaxed);
        self.processing_ms_sum.store(0, Ordering::Relaxed);
        self.confidence_sum_micros.store(0, Ordering::Relaxed);
        self.confidence_samples.store(0, Ordering::Relaxed);
        *tallies = Tallies::new();
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn request(document_type: DocumentType, success: bool, ms: u64, confidence: Option<f64>) -> RequestRecord {
        RequestRecord {
            document_type,
            processing_time_ms: ms,
            success,
            confidence,
            error_code: (!success).then_some(ErrorCode::ParseFailed),
        }
    }

    #[test]
    fn empty_collector_defaults() {
        let snap = VisionMetrics::new().snapshot();
        assert_eq!(snap.total_requests, 0);
        assert!((snap.success_rate - 1.0).abs() < f64::EPSILON);
        assert!((snap.overall_accuracy - 1.0).abs() < f64::EPSILON);
        assert!(snap.confidence_calibration_error.abs() < f64::EPSILON);
        assert!(snap.avg_processing_time_ms.abs() < f64::EPSILON);
    }

    #[test]
    fn aggregates_requests() {
        let metrics = VisionMetrics::new();
        metrics.record_request(&request(DocumentType::Odometer, true, 100, Some(0.9)));
        metrics.record_request(&request(DocumentType::Odometer, false, 300, None));
        metrics.record_request(&request(DocumentType::FuelReceipt, true, 200, Some(0.7)));

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.successful_requests, 2);
        assert_eq!(snap.failed_requests, 1);
        assert!((snap.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((snap.avg_processing_time_ms - 200.0).abs() < 1e-9);
        assert!((snap.avg_confidence - 0.8).abs() < 1e-9);
        assert_eq!(snap.errors_by_code.get("PARSE_FAILED"), Some(&1));

        let Some(odometer) = snap.by_document_type.get("odometer") else {
            panic!("odometer stats expected");
        };
        assert_eq!(odometer.requests, 2);
        assert_eq!(odometer.failed, 1);
        assert!((odometer.success_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn accuracy_and_calibration() {
        let metrics = VisionMetrics::new();
        let fields = |pairs: &[(&str, bool)]| {
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), *v))
                .collect::<BTreeMap<_, _>>()
        };
        // Predicted 0.95, observed 1.0 -> gap 0.05.
        metrics.record_accuracy(&AccuracyRecord {
            document_type: DocumentType::FuelReceipt,
            field_accuracies: fields(&[("gallons", true), ("total_amount", true)]),
            predicted_confidence: 0.95,
        });
        // Predicted 0.35, observed 0.5 -> gap 0.15.
        metrics.record_accuracy(&AccuracyRecord {
            document_type: DocumentType::FuelReceipt,
            field_accuracies: fields(&[("gallons", false), ("total_amount", true)]),
            predicted_confidence: 0.35,
        });
        metrics.record_accuracy(&AccuracyRecord {
            document_type: DocumentType::FuelReceipt,
            field_accuracies: BTreeMap::new(),
            predicted_confidence: 0.1,
        });

        let snap = metrics.snapshot();
        assert_eq!(snap.accuracy_samples, 2);
        assert!((snap.overall_accuracy - 0.75).abs() < 1e-9);
        assert!((snap.confidence_calibration_error - 0.10).abs() < 1e-9);
        let Some(gallons) = snap.field_accuracy.get("fuel_receipt.gallons") else {
            panic!("field stats expected");
        };
        assert_eq!((gallons.correct, gallons.total), (1, 2));
        let Some(fuel) = snap.by_document_type.get("fuel_receipt") else {
            panic!("type stats expected");
        };
        assert_eq!(fuel.accuracy, Some(0.75));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let metrics = VisionMetrics::new();
        let mut field_accuracies: BTreeMap<String, bool> =
            (0..500).map(|i| (format!("junk_{i}"), false)).collect();
        field_accuracies.insert("reading".to_string(), true);
        metrics.record_accuracy(&AccuracyRecord {
            document_type: DocumentType::Odometer,
            field_accuracies,
            predicted_confidence: 0.9,
        });
        metrics.record_accuracy(&AccuracyRecord {
            document_type: DocumentType::Odometer,
            field_accuracies: BTreeMap::from([("not_a_field".to_string(), false)]),
            predicted_confidence: 0.9,
        });

        let snap = metrics.snapshot();
        assert_eq!(snap.accuracy_samples, 1);
        assert!((snap.overall_accuracy - 1.0).abs() < f64::EPSILON);
        assert_eq!(snap.field_accuracy.len(), 1);
        assert!(snap.field_accuracy.contains_key("odometer.reading"));
    }

    #[test]
    fn bucket_edges() {
        assert_eq!(bucket_index(0.0), 0);
        assert_eq!(bucket_index(0.099), 0);
        assert_eq!(bucket_index(0.1), 1);
        assert_eq!(bucket_index(1.0), 9);
        assert_eq!(bucket_index(7.0), 9);
        assert_eq!(bucket_index(-1.0), 0);
    }

    #[test]
    fn reset_clears_everything() {
        let metrics = VisionMetrics::new();
        metrics.record_request(&request(DocumentType::Vin, false, 10, None));
        let before = metrics.snapshot().collected_since;
        metrics.reset();
        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 0);
        assert!(snap.errors_by_code.is_empty());
        assert!(snap.by_document_type.is_empty());
        assert!(snap.collected_since >= before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_recording_loses_nothing() {
        const TASKS: u64 = 64;
        const PER_TASK: u64 = 50;
        let metrics = Arc::new(VisionMetrics::new());
        let mut handles = Vec::new();
        for i in 0..TASKS {
            let metrics = Arc::clone(&metrics);
            handles.push(tokio::spawn(async move {
                for _ in 0..PER_TASK {
                    metrics.record_request(&request(DocumentType::Odometer, i % 2 == 0, 10, Some(0.5)));
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            let Ok(()) = handle.await else {
                panic!("task panicked");
            };
        }
        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, TASKS * PER_TASK);
        assert_eq!(snap.successful_requests, TASKS / 2 * PER_TASK);
        assert_eq!(snap.errors_by_code.get("PARSE_FAILED"), Some(&(TASKS / 2 * PER_TASK)));
        let Some(odometer) = snap.by_document_type.get("odometer") else {
            panic!("odometer stats expected");
        };
        assert_eq!(odometer.requests, TASKS * PER_TASK);
        assert!((snap.avg_confidence - 0.5).abs() < 1e-9);
    }
}
