//! Confidence extraction from event payloads.
//!
//! Payloads carry confidence in several historical shapes. The extractor
//! walks them in a fixed precedence order and stops at the first match;
//! when nothing is reported it falls back to averaging whatever per-field
//! validation scores are present, and finally to a default.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::lookup::{FieldPath, as_strict_number};

/// Confidence assumed when a payload carries no usable signal.
pub const DEFAULT_CONFIDENCE: f64 = 0.6;

/// Confidence assigned to a payload whose validation rollup is `"ok"`.
/// A policy value, not a measurement.
pub const ROLLUP_OK_CONFIDENCE: f64 = 0.8;

/// Scores below this threshold are shown to the user with a warning.
pub const WARNING_THRESHOLD: f64 = 0.7;

/// Scores below this threshold get the low-confidence warning text.
pub const LOW_WARNING_THRESHOLD: f64 = 0.5;

/// Warning shown for confidence below [`LOW_WARNING_THRESHOLD`].
pub const LOW_CONFIDENCE_MESSAGE: &str = "Low confidence - please review extracted data";

/// Warning shown for confidence in `[0.5, 0.7)`.
pub const MEDIUM_CONFIDENCE_MESSAGE: &str = "Medium confidence - some fields may need verification";

/// Internal label for confidence at or above [`WARNING_THRESHOLD`]. Never
/// shown to users.
pub const HIGH_CONFIDENCE_MESSAGE: &str = "High confidence";

const DIRECT: FieldPath = FieldPath::new(&["confidence"]);
const DATA: FieldPath = FieldPath::new(&["data", "confidence"]);
const DATA_ROLLUP: FieldPath = FieldPath::new(&["data", "validation", "rollup"]);
const EXTRACTED: FieldPath = FieldPath::new(&["extracted_data", "confidence"]);

/// Per-field scores produced by the dashboard vision prompt.
const DATA_VALIDATION_SCORES: [FieldPath; 3] = [
    FieldPath::new(&["data", "validation", "odometer_conf"]),
    FieldPath::new(&["data", "validation", "fuel_conf"]),
    FieldPath::new(&["data", "validation", "lights_conf"]),
];

const VALIDATION: FieldPath = FieldPath::new(&["validation"]);

/// Coarse confidence bucket for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    /// Confidence `>= 0.8`.
    High,
    /// Confidence `>= 0.6` and `< 0.8`.
    Medium,
    /// Confidence `< 0.6`.
    Low,
}

impl ConfidenceLevel {
    /// Classifies a confidence score.
    #[must_use]
    pub fn from_score(confidence: f64) -> Self {
        if confidence >= 0.8 {
            Self::High
        } else if confidence >= 0.6 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Derives a `[0, 1]` confidence score from a payload.
///
/// Precedence, first match wins:
/// 1. numeric `confidence`
/// 2. numeric `data.confidence`
/// 3. `data.validation.rollup == "ok"` → [`ROLLUP_OK_CONFIDENCE`]
/// 4. numeric `extracted_data.confidence`
/// 5. mean of the `[0, 1]` scores found by [`estimate_from_validation`],
///    or [`DEFAULT_CONFIDENCE`] when there are none
///
/// Reported values are clamped into `[0, 1]`. Never panics.
#[must_use]
pub fn extract_confidence(payload: &Value) -> f64 {
    if let Some(c) = reported(payload, DIRECT) {
        return c;
    }
    if let Some(c) = reported(payload, DATA) {
        return c;
    }
    if DATA_ROLLUP.resolve(payload).and_then(Value::as_str) == Some("ok") {
        return ROLLUP_OK_CONFIDENCE;
    }
    if let Some(c) = reported(payload, EXTRACTED) {
        return c;
    }
    estimate_from_validation(payload).unwrap_or(DEFAULT_CONFIDENCE)
}

/// Averages every numeric validation score in `[0, 1]` found at
/// `data.validation.{odometer_conf, fuel_conf, lights_conf}` and directly
/// under a top-level `validation` object.
///
/// This is a heuristic with no accuracy guarantee. Returns `None` when no
/// score was found.
#[must_use]
pub fn estimate_from_validation(payload: &Value) -> Option<f64> {
    let in_unit_range = |v: &f64| (0.0..=1.0).contains(v);

    let dashboard_scores = DATA_VALIDATION_SCORES
        .iter()
        .filter_map(|path| path.resolve(payload))
        .filter_map(as_strict_number);

    let generic_scores = VALIDATION
        .resolve(payload)
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|obj| obj.values())
        .filter_map(as_strict_number);

    let (sum, count) = dashboard_scores
        .chain(generic_scores)
        .filter(in_unit_range)
        .fold((0.0_f64, 0_u32), |(sum, count), v| (sum + v, count + 1));

    (count > 0).then(|| sum / f64::from(count))
}

/// Returns the user-facing warning for a confidence score, if one must be
/// shown. The boundary is strict: exactly `0.7` shows no warning.
#[must_use]
pub fn confidence_warning(confidence: f64) -> Option<&'static str> {
    if confidence < LOW_WARNING_THRESHOLD {
        Some(LOW_CONFIDENCE_MESSAGE)
    } else if confidence < WARNING_THRESHOLD {
        Some(MEDIUM_CONFIDENCE_MESSAGE)
    } else {
        None
    }
}

/// Returns the message for any score, including the internal-only high
/// confidence label.
#[must_use]
pub fn confidence_message(confidence: f64) -> &'static str {
    confidence_warning(confidence).unwrap_or(HIGH_CONFIDENCE_MESSAGE)
}

fn reported(payload: &Value, path: FieldPath) -> Option<f64> {
    path.resolve(payload)
        .and_then(as_strict_number)
        .map(|c| c.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn direct_confidence_wins_over_data() {
        let payload = json!({"confidence": 0.9, "data": {"confidence": 0.3}});
        assert!(close(extract_confidence(&payload), 0.9));
    }

    #[test]
    fn data_confidence_used_when_no_direct() {
        let payload = json!({"data": {"confidence": 0.42, "validation": {"rollup": "ok"}}});
        assert!(close(extract_confidence(&payload), 0.42));
    }

    #[test]
    fn rollup_ok_beats_extracted_data() {
        let payload = json!({
            "data": {"validation": {"rollup": "ok"}},
            "extracted_data": {"confidence": 0.2}
        });
        assert!(close(extract_confidence(&payload), ROLLUP_OK_CONFIDENCE));
    }

    #[test]
    fn rollup_other_than_ok_falls_through() {
        let payload = json!({
            "data": {"validation": {"rollup": "review"}},
            "extracted_data": {"confidence": 0.55}
        });
        assert!(close(extract_confidence(&payload), 0.55));
    }

    #[test]
    fn no_signal_returns_default() {
        assert!(close(extract_confidence(&json!({})), 0.6));
        assert!(close(extract_confidence(&json!({"gallons": 10})), 0.6));
        assert!(close(extract_confidence(&json!(null)), 0.6));
        assert!(close(extract_confidence(&json!("text")), 0.6));
    }

    #[test]
    fn string_confidence_is_not_numeric() {
        let payload = json!({"confidence": "0.95"});
        assert!(close(extract_confidence(&payload), DEFAULT_CONFIDENCE));
    }

    #[test]
    fn reported_values_are_clamped() {
        assert!(close(extract_confidence(&json!({"confidence": 1.7})), 1.0));
        assert!(close(extract_confidence(&json!({"confidence": -0.2})), 0.0));
    }

    // The validation-score mean is a policy heuristic, not a calibrated
    // estimate; these tests pin the policy.
    #[test]
    fn policy_mean_of_dashboard_scores() {
        let payload = json!({
            "data": {"validation": {"odometer_conf": 0.9, "fuel_conf": 0.6, "lights_conf": 0.3}}
        });
        assert!(close(extract_confidence(&payload), 0.6));
    }

    #[test]
    fn policy_mean_includes_generic_validation_and_skips_out_of_range() {
        let payload = json!({
            "data": {"validation": {"odometer_conf": 1.0}},
            "validation": {"vin_conf": 0.5, "count": 7, "label": "x"}
        });
        assert!(close(extract_confidence(&payload), 0.75));
    }

    #[test]
    fn policy_estimate_none_without_scores() {
        assert_eq!(estimate_from_validation(&json!({"validation": {"rollup": "ok"}})), None);
    }

    #[test]
    fn warning_boundary_is_strict() {
        assert_eq!(confidence_warning(0.7), None);
        assert_eq!(confidence_warning(0.6999), Some(MEDIUM_CONFIDENCE_MESSAGE));
        assert_eq!(confidence_warning(0.5), Some(MEDIUM_CONFIDENCE_MESSAGE));
        assert_eq!(confidence_warning(0.4999), Some(LOW_CONFIDENCE_MESSAGE));
        assert_eq!(confidence_message(0.95), HIGH_CONFIDENCE_MESSAGE);
    }

    #[test]
    fn levels() {
        assert_eq!(ConfidenceLevel::from_score(0.8), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.79), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.6), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.59), ConfidenceLevel::Low);
    }
}
