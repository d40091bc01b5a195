//! Health classification over a metrics snapshot.

use serde::Serialize;
use utoipa::ToSchema;

use super::MetricsSnapshot;

/// Success rate below which the service is critical.
pub const CRITICAL_SUCCESS_RATE: f64 = 0.80;
/// Accuracy below which the service is critical.
pub const CRITICAL_ACCURACY: f64 = 0.70;
/// Success rate below which the service needs attention.
pub const WARNING_SUCCESS_RATE: f64 = 0.95;
/// Accuracy below which the service needs attention.
pub const WARNING_ACCURACY: f64 = 0.90;
/// Mean processing time above which the service needs attention.
pub const WARNING_PROCESSING_MS: f64 = 10_000.0;

/// Overall service health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// All thresholds met.
    Healthy,
    /// Degraded but serving.
    Warning,
    /// Failing thresholds that need intervention.
    Critical,
}

/// Status plus the thresholds that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HealthAssessment {
    /// Overall status.
    pub status: HealthStatus,
    /// Human-readable breaches, most severe first.
    pub issues: Vec<String>,
}

/// Classifies `snapshot` into a [`HealthStatus`].
#[must_use]
pub fn classify_health(snapshot: &MetricsSnapshot) -> HealthStatus {
    assess_health(snapshot).status
}

/// Classifies `snapshot` and lists every breached threshold.
#[must_use]
pub fn assess_health(snapshot: &MetricsSnapshot) -> HealthAssessment {
    let mut critical = Vec::new();
    let mut warning = Vec::new();

    if snapshot.success_rate < CRITICAL_SUCCESS_RATE {
        critical.push(format!("success rate {:.3} below {CRITICAL_SUCCESS_RATE}", snapshot.success_rate));
    } else if snapshot.success_rate < WARNING_SUCCESS_RATE {
        warning.push(format!("success rate {:.3} below {WARNING_SUCCESS_RATE}", snapshot.success_rate));
    }

    if snapshot.overall_accuracy < CRITICAL_ACCURACY {
        critical.push(format!("accuracy {:.3} below {CRITICAL_ACCURACY}", snapshot.overall_accuracy));
    } else if snapshot.overall_accuracy < WARNING_ACCURACY {
        warning.push(format!("accuracy {:.3} below {WARNING_ACCURACY}", snapshot.overall_accuracy));
    }

    if snapshot.avg_processing_time_ms > WARNING_PROCESSING_MS {
        warning.push(format!(
            "average processing time {:.0} ms above {WARNING_PROCESSING_MS} ms",
            snapshot.avg_processing_time_ms
        ));
    }

    let status = if !critical.is_empty() {
        HealthStatus::Critical
    } else if !warning.is_empty() {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    };
    critical.extend(warning);
    HealthAssessment {
        status,
        issues: critical,
    }
}
