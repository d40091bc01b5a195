//! Payload interpretation: confidence, vendor and summary.
//!
//! Everything here is a pure, total function over arbitrary payload
//! shapes. Missing fields always produce a documented fallback (default
//! confidence, no vendor, generic summary), never an error.

pub mod confidence;
pub mod lookup;
pub mod summary;
pub mod vendor;

use serde::Serialize;
use utoipa::ToSchema;

pub use confidence::{ConfidenceLevel, confidence_warning, extract_confidence};
pub use summary::{generate_summary, summarize_event};
pub use vendor::{normalize_vendor_name, resolve_vendor};

use crate::domain::Event;

/// Display-ready interpretation of one event.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EventInsight {
    /// One-line summary.
    pub summary: String,
    /// Normalized vendor name, if the payload names one.
    pub vendor: Option<String>,
    /// Confidence score in `[0, 1]`.
    pub confidence: f64,
    /// Confidence bucket.
    pub confidence_level: ConfidenceLevel,
    /// Warning text the user must see, if any.
    pub warning: Option<String>,
}

impl EventInsight {
    /// Interprets an event.
    #[must_use]
    pub fn of(event: &Event) -> Self {
        let confidence = extract_confidence(&event.payload);
        Self {
            summary: summarize_event(event),
            vendor: resolve_vendor(&event.payload),
            confidence,
            confidence_level: ConfidenceLevel::from_score(confidence),
            warning: confidence_warning(confidence).map(str::to_string),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::EventType;
    use chrono::NaiveDate;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn insight_of_low_confidence_event_carries_warning() {
        let Some(date) = NaiveDate::from_ymd_opt(2025, 6, 1) else {
            panic!("valid date");
        };
        let event = Event::new(
            Uuid::new_v4(),
            EventType::Fuel,
            date,
            json!({"gallons": 8, "station_name": "Costco", "confidence": 0.45}),
        );
        let insight = EventInsight::of(&event);
        assert_eq!(insight.summary, "Fuel 8 gal at Costco");
        assert_eq!(insight.vendor.as_deref(), Some("Costco"));
        assert_eq!(insight.confidence_level, ConfidenceLevel::Low);
        assert_eq!(
            insight.warning.as_deref(),
            Some(confidence::LOW_CONFIDENCE_MESSAGE)
        );
    }
}
