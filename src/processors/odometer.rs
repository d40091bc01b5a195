//! Odometer photo processor.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::reply::{Reply, scrape_number};
use super::{DocumentProcessor, Parsed, round_to};
use crate::domain::{DocumentType, ProcessingContext, ValidationResult};
use crate::enrichment::EnrichmentError;
use crate::insight::lookup::parse_numeric_text;
use crate::insight::summary::format_miles;

/// Miles per kilometre.
pub const MILES_PER_KM: f64 = 0.621_371;
/// Readings above this are rejected as misreads.
pub const MAX_ODOMETER_MILES: f64 = 2_000_000.0;
/// Metadata key holding the vehicle's last recorded odometer.
pub const LAST_ODOMETER_KEY: &str = "last_odometer_miles";

static UNIT_READING_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,3}(?:,\d{3})+|\d{1,7})(?:\.\d)?\s*(miles|mi\b|km\b|kilomet)").ok()
});
static ODO_LABEL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)odo\w*\D{0,10}?(\d{1,3}(?:,\d{3})+|\d{3,7})").ok());

/// Distance unit shown on the display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    /// Miles.
    #[default]
    Mi,
    /// Kilometres.
    Km,
}

impl DistanceUnit {
    /// Reads a unit label; anything starting with `k` is kilometres.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        if label.trim().to_lowercase().starts_with('k') {
            Self::Km
        } else {
            Self::Mi
        }
    }

    /// Converts a reading in this unit to miles.
    #[must_use]
    pub fn to_miles(self, reading: f64) -> f64 {
        match self {
            Self::Mi => reading,
            Self::Km => round_to(reading * MILES_PER_KM, 1),
        }
    }
}

/// Fields extracted from an odometer photo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OdometerData {
    /// Reading as displayed, in `unit`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<f64>,
    /// Display unit.
    pub unit: DistanceUnit,
    /// Reading converted to miles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub miles: Option<f64>,
    /// Trip meter, when visible.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_reading: Option<f64>,
    /// `digital` or `analog`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_type: Option<String>,
    /// Model-reported confidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Distance since the previous recorded reading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub miles_since_last_reading: Option<f64>,
}

/// Reads the odometer from dashboard cluster photos.
#[derive(Debug, Clone, Copy, Default)]
pub struct OdometerProcessor;

impl OdometerProcessor {
    /// Creates the processor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

pub(crate) fn scrape_reading(text: &str) -> Option<(f64, DistanceUnit)> {
    if let Some(caps) = UNIT_READING_RE.as_ref().and_then(|re| re.captures(text)) {
        let reading = caps.get(1).and_then(|m| parse_numeric_text(m.as_str()));
        let unit = caps
            .get(2)
            .map_or(DistanceUnit::Mi, |m| DistanceUnit::from_label(m.as_str()));
        if let Some(reading) = reading {
            return Some((reading, unit));
        }
    }
    scrape_number(ODO_LABEL_RE.as_ref(), text).map(|reading| (reading, DistanceUnit::Mi))
}

#[async_trait]
impl DocumentProcessor for OdometerProcessor {
    type Data = OdometerData;

    fn document_type(&self) -> DocumentType {
        DocumentType::Odometer
    }

    fn version(&self) -> &'static str {
        "1.1.0"
    }

    fn prompt(&self, context: &ProcessingContext) -> String {
        let mut prompt = String::from(
            "You are reading a photo of a vehicle odometer. \
             Reply with a single JSON object and nothing else, using these keys: \
             reading (the total odometer value as a number, not the trip meter), \
             unit (\"mi\" or \"km\"), trip_reading (number or null), \
             display_type (\"digital\" or \"analog\"), confidence (0 to 1).",
        );
        if let Some(last) = context.metadata_number(LAST_ODOMETER_KEY) {
            prompt.push_str(&format!(
                " The previous recorded reading was {} miles; the odometer cannot be lower.",
                format_miles(last)
            ));
        }
        prompt
    }

    fn parse(&self, raw_text: &str, _context: &ProcessingContext) -> Parsed<OdometerData> {
        let reply = Reply::parse(raw_text);
        let mut notes = Vec::new();

        let mut data = if reply.has_json() {
            let reading = reply.number(&["reading", "odometer", "odometer_reading", "value"]);
            let (reading, unit) = match reading {
                Some(r) => (
                    Some(r),
                    reply
                        .text_field(&["unit", "units"])
                        .map_or(DistanceUnit::Mi, |u| DistanceUnit::from_label(&u)),
                ),
                None => (reply.number(&["miles", "odometer_miles"]), DistanceUnit::Mi),
            };
            OdometerData {
                reading,
                unit,
                trip_reading: reply.number(&["trip_reading", "trip"]),
                display_type: reply
                    .text_field(&["display_type", "display"])
                    .map(|d| d.to_lowercase()),
                confidence: reply.confidence(),
                ..OdometerData::default()
            }
        } else {
            notes.push("model reply was not JSON; reading scraped from text".to_string());
            let scraped = scrape_reading(reply.text());
            OdometerData {
                reading: scraped.map(|(r, _)| r),
                unit: scraped.map_or(DistanceUnit::Mi, |(_, u)| u),
                ..OdometerData::default()
            }
        };

        data.miles = data.reading.map(|r| data.unit.to_miles(r));
        if data.unit == DistanceUnit::Km {
            notes.push("reading converted from kilometres".to_string());
        }
        let usable = data.miles.is_some();
        Parsed { data, usable, notes }
    }

    async fn validate(&self, data: &OdometerData, context: &ProcessingContext) -> ValidationResult {
        let mut v = ValidationResult::ok();
        let Some(miles) = data.miles else {
            v.add_error("no odometer reading found");
            return v;
        };

        if miles < 0.0 {
            v.add_error(format!("odometer {miles} is negative"));
        } else if miles > MAX_ODOMETER_MILES {
            v.add_error(format!(
                "odometer {} exceeds {} mi",
                format_miles(miles),
                format_miles(MAX_ODOMETER_MILES)
            ));
        } else if miles < 10.0 {
            v.add_warning("odometer reading is unusually low");
        }

        if let Some(last) = context.metadata_number(LAST_ODOMETER_KEY)
            && miles < last
        {
            v.add_error(format!(
                "odometer {} mi is below the last recorded {} mi",
                format_miles(miles),
                format_miles(last)
            ));
        }
        if let (Some(trip), Some(reading)) = (data.trip_reading, data.reading)
            && trip > reading
        {
            v.add_warning("trip reading exceeds odometer; values may be swapped");
        }
        v
    }

    fn supports_enrichment(&self) -> bool {
        true
    }

    async fn enrich(
        &self,
        data: &OdometerData,
        context: &ProcessingContext,
    ) -> Result<Option<OdometerData>, EnrichmentError> {
        let (Some(miles), Some(last)) = (data.miles, context.metadata_number(LAST_ODOMETER_KEY)) else {
            return Ok(None);
        };
        Ok(Some(OdometerData {
            miles_since_last_reading: Some(round_to(miles - last, 1)),
            ..data.clone()
        }))
    }

    fn format(&self, data: &OdometerData) -> Option<String> {
        let miles = data.miles?;
        let mut line = format!("{} mi", format_miles(miles));
        if let (DistanceUnit::Km, Some(reading)) = (data.unit, data.reading) {
            line.push_str(&format!(" ({} km)", format_miles(reading)));
        }
        Some(line)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn ctx() -> ProcessingContext {
        ProcessingContext::new(DocumentType::Odometer)
    }

    #[test]
    fn parses_json_in_km() {
        let parsed = OdometerProcessor::new().parse(
            r#"{"reading": "100,000", "unit": "KM", "display_type": "Digital", "confidence": 0.9}"#,
            &ctx(),
        );
        assert!(parsed.usable);
        assert_eq!(parsed.data.unit, DistanceUnit::Km);
        assert_eq!(parsed.data.miles, Some(62137.1));
        assert_eq!(parsed.data.display_type.as_deref(), Some("digital"));
        assert!(parsed.notes.iter().any(|n| n.contains("kilometres")));
    }

    #[test]
    fn miles_key_is_accepted() {
        let parsed = OdometerProcessor::new().parse(r#"{"miles": 45210}"#, &ctx());
        assert_eq!(parsed.data.miles, Some(45210.0));
        assert_eq!(parsed.data.unit, DistanceUnit::Mi);
    }

    #[test]
    fn scrapes_plain_text() {
        let p = OdometerProcessor::new();
        let parsed = p.parse("The odometer shows 45,210 mi and trip A 120.4", &ctx());
        assert!(parsed.usable);
        assert_eq!(parsed.data.miles, Some(45210.0));

        let parsed = p.parse("ODO 88120", &ctx());
        assert_eq!(parsed.data.miles, Some(88120.0));

        let parsed = p.parse("too blurry", &ctx());
        assert!(!parsed.usable);
    }

    #[tokio::test]
    async fn reading_below_previous_is_error() {
        let p = OdometerProcessor::new();
        let ctx = ctx().with_metadata(LAST_ODOMETER_KEY, 50_000);
        let data = OdometerData {
            reading: Some(45_210.0),
            miles: Some(45_210.0),
            ..OdometerData::default()
        };
        let v = p.validate(&data, &ctx).await;
        assert!(!v.valid);
        assert!(v.errors.iter().any(|e| e.contains("50,000")));
    }

    #[tokio::test]
    async fn bounds_are_checked() {
        let p = OdometerProcessor::new();
        let huge = OdometerData {
            miles: Some(2_500_000.0),
            ..OdometerData::default()
        };
        assert!(!p.validate(&huge, &ctx()).await.valid);
        let missing = OdometerData::default();
        assert!(!p.validate(&missing, &ctx()).await.valid);
    }

    #[tokio::test]
    async fn enrichment_computes_distance_since_last() {
        let p = OdometerProcessor::new();
        let data = OdometerData {
            reading: Some(45_210.0),
            miles: Some(45_210.0),
            ..OdometerData::default()
        };
        assert!(matches!(p.enrich(&data, &ctx()).await, Ok(None)));

        let ctx = ctx().with_metadata(LAST_ODOMETER_KEY, "44,900");
        let Ok(Some(enriched)) = p.enrich(&data, &ctx).await else {
            panic!("enrichment expected");
        };
        assert_eq!(enriched.miles_since_last_reading, Some(310.0));
    }

    #[test]
    fn prompt_mentions_previous_reading() {
        let p = OdometerProcessor::new();
        let with_last = ctx().with_metadata(LAST_ODOMETER_KEY, 44_900);
        assert!(p.prompt(&with_last).contains("44,900 miles"));
        assert!(!p.prompt(&ctx()).contains("previous"));
    }

    #[test]
    fn format_shows_both_units_for_km() {
        let p = OdometerProcessor::new();
        let data = OdometerData {
            reading: Some(100_000.0),
            unit: DistanceUnit::Km,
            miles: Some(62_137.1),
            ..OdometerData::default()
        };
        assert_eq!(p.format(&data).as_deref(), Some("62,137 mi (100,000 km)"));
    }
}
