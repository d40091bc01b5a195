//! Serializable metrics view.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::Tallies;

/// Per-document-type aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DocumentTypeStats {
    /// Requests processed.
    pub requests: u64,
    /// Successful requests.
    pub successful: u64,
    /// Failed requests.
    pub failed: u64,
    /// `successful / requests`; 1.0 with no requests.
    pub success_rate: f64,
    /// Mean processing time in milliseconds.
    pub avg_processing_time_ms: f64,
    /// Mean confidence over requests that reported one.
    pub avg_confidence: f64,
    /// Field accuracy from reviewed results, if any were recorded.
    pub accuracy: Option<f64>,
}

/// Correct/total counts for one `type.field` key.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FieldAccuracy {
    /// Reviews that marked the field correct.
    pub correct: u64,
    /// Reviews that covered the field.
    pub total: u64,
    /// `correct / total`.
    pub accuracy: f64,
}

/// Point-in-time metrics.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MetricsSnapshot {
    /// Requests processed since the last reset.
    pub total_requests: u64,
    /// Successful requests.
    pub successful_requests: u64,
    /// Failed requests.
    pub failed_requests: u64,
    /// `successful / total`; 1.0 with no requests.
    pub success_rate: f64,
    /// Share of reviewed fields that were correct; 1.0 with no reviews.
    pub overall_accuracy: f64,
    /// Number of accuracy reviews recorded.
    pub accuracy_samples: u64,
    /// Mean processing time in milliseconds.
    pub avg_processing_time_ms: f64,
    /// Mean confidence over requests that reported one.
    pub avg_confidence: f64,
    /// Expected calibration error over ten confidence buckets.
    pub confidence_calibration_error: f64,
    /// Failure counts keyed by error code.
    pub errors_by_code: BTreeMap<String, u64>,
    /// Aggregates keyed by document type tag.
    pub by_document_type: BTreeMap<String, DocumentTypeStats>,
    /// Accuracy keyed by `type.field`.
    pub field_accuracy: BTreeMap<String, FieldAccuracy>,
    /// Start of the collection window.
    pub collected_since: DateTime<Utc>,
}

pub(super) struct Counters {
    pub(super) total: u64,
    pub(super) successful: u64,
    pub(super) processing_ms: u64,
    pub(super) confidence_sum: f64,
    pub(super) confidence_samples: u64,
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: u64, denominator: u64, empty: f64) -> f64 {
    if denominator == 0 {
        empty
    } else {
        numerator as f64 / denominator as f64
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(sum: f64, samples: u64) -> f64 {
    if samples == 0 { 0.0 } else { sum / samples as f64 }
}

/// Count-weighted mean gap between predicted and observed accuracy.
fn calibration_error(tallies: &Tallies) -> f64 {
    let samples: u64 = tallies.calibration.iter().map(|b| b.samples).sum();
    if samples == 0 {
        return 0.0;
    }
    let weighted: f64 = tallies
        .calibration
        .iter()
        .filter(|b| b.samples > 0)
        .map(|b| {
            let predicted = mean(b.predicted_sum, b.samples);
            let observed = mean(b.observed_sum, b.samples);
            #[allow(clippy::cast_precision_loss)]
            let weight = b.samples as f64;
            (predicted - observed).abs() * weight
        })
        .sum();
    mean(weighted, samples)
}

pub(super) fn build(counters: Counters, tallies: &Tallies) -> MetricsSnapshot {
    let by_document_type = tallies
        .by_type
        .iter()
        .map(|(document_type, t)| {
            #[allow(clippy::cast_precision_loss)]
            let processing_ms = t.processing_ms as f64;
            let stats = DocumentTypeStats {
                requests: t.requests,
                successful: t.successes,
                failed: t.requests.saturating_sub(t.successes),
                success_rate: ratio(t.successes, t.requests, 1.0),
                avg_processing_time_ms: mean(processing_ms, t.requests),
                avg_confidence: mean(t.confidence_sum, t.confidence_samples),
                accuracy: (t.fields_total > 0).then(|| ratio(t.fields_correct, t.fields_total, 1.0)),
            };
            (document_type.to_string(), stats)
        })
        .collect();

    let field_accuracy = tallies
        .fields
        .iter()
        .map(|((document_type, field), (correct, total))| {
            let accuracy = FieldAccuracy {
                correct: *correct,
                total: *total,
                accuracy: ratio(*correct, *total, 1.0),
            };
            (format!("{document_type}.{field}"), accuracy)
        })
        .collect();

    let errors_by_code = tallies
        .errors
        .iter()
        .map(|(code, count)| (code.to_string(), *count))
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let processing_ms = counters.processing_ms as f64;

    MetricsSnapshot {
        total_requests: counters.total,
        successful_requests: counters.successful,
        failed_requests: counters.total.saturating_sub(counters.successful),
        success_rate: ratio(counters.successful, counters.total, 1.0),
        overall_accuracy: ratio(tallies.fields_correct, tallies.fields_total, 1.0),
        accuracy_samples: tallies.accuracy_samples,
        avg_processing_time_ms: mean(processing_ms, counters.total),
        avg_confidence: mean(counters.confidence_sum, counters.confidence_samples),
        confidence_calibration_error: calibration_error(tallies),
        errors_by_code,
        by_document_type,
        field_accuracy,
        collected_since: tallies.collected_since,
    }
}
