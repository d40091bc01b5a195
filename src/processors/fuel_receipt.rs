//! Fuel receipt processor.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::reply::{Reply, parse_date, scrape_number, scrape_text};
use super::{DocumentProcessor, Parsed, round_to};
use crate::domain::{DocumentType, ProcessingContext, ValidationResult};
use crate::enrichment::EnrichmentError;
use crate::insight::normalize_vendor_name;
use crate::insight::summary::{format_amount, format_unit_price};

/// Largest plausible single fill, in gallons.
pub const MAX_GALLONS: f64 = 100.0;
/// Largest plausible pump price, in dollars per gallon.
pub const MAX_PRICE_PER_GALLON: f64 = 15.0;
/// Allowed relative gap between `gallons * price_per_gallon` and the total.
pub const TOTAL_TOLERANCE: f64 = 0.03;

static GALLONS_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:gal\b|gallons?\b|G\b)").ok());
static PRICE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\$?\s*(\d+\.\d{2,3})\s*/\s*(?:gal|g)\b").ok());
static TOTAL_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:total|amount|sale)\D{0,12}?\$?\s*(\d{1,4}(?:,\d{3})*\.\d{2})").ok()
});
static DATE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4})").ok());

/// Fields extracted from a fuel receipt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FuelReceiptData {
    /// Station or brand name as printed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_name: Option<String>,
    /// Station address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station_address: Option<String>,
    /// Purchase date, `YYYY-MM-DD` when recognized, else as printed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Gallons pumped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gallons: Option<f64>,
    /// Unit price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_per_gallon: Option<f64>,
    /// Amount charged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    /// Grade (regular, premium, diesel).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel_grade: Option<String>,
    /// Model-reported confidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Fields computed from the others rather than read.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_fields: Vec<String>,
}

/// Extracts gallons, price and total from pump receipts.
#[derive(Debug, Clone, Copy, Default)]
pub struct FuelReceiptProcessor;

impl FuelReceiptProcessor {
    /// Creates the processor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn normalized_date(text: String) -> String {
    parse_date(&text).map_or(text, |d| d.format("%Y-%m-%d").to_string())
}

#[async_trait]
impl DocumentProcessor for FuelReceiptProcessor {
    type Data = FuelReceiptData;

    fn document_type(&self) -> DocumentType {
        DocumentType::FuelReceipt
    }

    fn version(&self) -> &'static str {
        "1.2.0"
    }

    fn prompt(&self, _context: &ProcessingContext) -> String {
        "You are reading a photo of a gas station fuel receipt. \
         Reply with a single JSON object and nothing else, using these keys: \
         vendor_name (station brand), station_address, date (YYYY-MM-DD), \
         gallons (number), price_per_gallon (number, dollars), total_amount (number, dollars), \
         fuel_grade (regular, midgrade, premium or diesel), \
         confidence (0 to 1, how legible the receipt was). \
         Use null for anything you cannot read. Do not guess amounts."
            .to_string()
    }

    fn parse(&self, raw_text: &str, _context: &ProcessingContext) -> Parsed<FuelReceiptData> {
        let reply = Reply::parse(raw_text);
        let mut notes = Vec::new();

        let data = if reply.has_json() {
            FuelReceiptData {
                vendor_name: reply.text_field(&["vendor_name", "station_name", "station", "merchant"]),
                station_address: reply.text_field(&["station_address", "address"]),
                date: reply.text_field(&["date", "purchase_date"]).map(normalized_date),
                gallons: reply.number(&["gallons", "volume", "quantity"]),
                price_per_gallon: reply.number(&["price_per_gallon", "unit_price", "ppg"]),
                total_amount: reply.number(&["total_amount", "total", "amount"]),
                fuel_grade: reply
                    .text_field(&["fuel_grade", "grade", "fuel_type"])
                    .map(|g| g.to_lowercase()),
                confidence: reply.confidence(),
                derived_fields: Vec::new(),
            }
        } else {
            notes.push("model reply was not JSON; values scraped from text".to_string());
            let text = reply.text();
            FuelReceiptData {
                date: scrape_text(DATE_RE.as_ref(), text).map(normalized_date),
                gallons: scrape_number(GALLONS_RE.as_ref(), text),
                price_per_gallon: scrape_number(PRICE_RE.as_ref(), text),
                total_amount: scrape_number(TOTAL_RE.as_ref(), text),
                ..FuelReceiptData::default()
            }
        };

        let usable = data.gallons.is_some() || data.total_amount.is_some();
        Parsed { data, usable, notes }
    }

    async fn validate(&self, data: &FuelReceiptData, _context: &ProcessingContext) -> ValidationResult {
        let mut v = ValidationResult::ok();

        match data.gallons {
            Some(g) if g <= 0.0 || g > MAX_GALLONS => {
                v.add_error(format!("gallons {g} outside (0, {MAX_GALLONS}]"));
            }
            None => v.add_warning("gallons not found"),
            Some(_) => {}
        }
        if let Some(p) = data.price_per_gallon
            && (p <= 0.0 || p > MAX_PRICE_PER_GALLON)
        {
            v.add_error(format!("price per gallon {p} outside (0, {MAX_PRICE_PER_GALLON}]"));
        }
        match data.total_amount {
            Some(t) if t < 0.0 => v.add_error(format!("total amount {t} is negative")),
            None => v.add_warning("total amount not found"),
            Some(_) => {}
        }

        if let (Some(g), Some(p), Some(t)) = (data.gallons, data.price_per_gallon, data.total_amount)
            && t > 0.0
        {
            let expected = g * p;
            if ((expected - t) / t).abs() > TOTAL_TOLERANCE {
                v.add_warning(format!(
                    "total {} differs from gallons x price {}",
                    format_amount(t),
                    format_amount(expected)
                ));
            }
        }

        if let Some(date) = data.date.as_deref() {
            match parse_date(date) {
                None => v.add_warning(format!("date '{date}' not recognized")),
                Some(d) if d > Utc::now().date_naive() + Duration::days(1) => {
                    v.add_warning(format!("date {d} is in the future"));
                }
                Some(_) => {}
            }
        }
        v
    }

    fn supports_enrichment(&self) -> bool {
        true
    }

    async fn enrich(
        &self,
        data: &FuelReceiptData,
        _context: &ProcessingContext,
    ) -> Result<Option<FuelReceiptData>, EnrichmentError> {
        let mut out = data.clone();
        match (data.gallons, data.price_per_gallon, data.total_amount) {
            (Some(g), Some(p), None) => {
                out.total_amount = Some(round_to(g * p, 2));
                out.derived_fields.push("total_amount".to_string());
            }
            (Some(g), None, Some(t)) if g > 0.0 => {
                out.price_per_gallon = Some(round_to(t / g, 3));
                out.derived_fields.push("price_per_gallon".to_string());
            }
            (None, Some(p), Some(t)) if p > 0.0 => {
                out.gallons = Some(round_to(t / p, 3));
                out.derived_fields.push("gallons".to_string());
            }
            _ => return Ok(None),
        }
        Ok(Some(out))
    }

    fn format(&self, data: &FuelReceiptData) -> Option<String> {
        let mut line = data
            .vendor_name
            .as_deref()
            .map_or_else(|| "Fuel".to_string(), normalize_vendor_name);
        if let Some(g) = data.gallons {
            line.push_str(&format!(" - {g:.3} gal"));
        }
        if let Some(p) = data.price_per_gallon {
            line.push_str(&format!(" @ ${}/gal", format_unit_price(p)));
        }
        if let Some(t) = data.total_amount {
            line.push_str(&format!(" = {}", format_amount(t)));
        }
        Some(line)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn ctx() -> ProcessingContext {
        ProcessingContext::new(DocumentType::FuelReceipt)
    }

    fn parse(raw: &str) -> Parsed<FuelReceiptData> {
        FuelReceiptProcessor::new().parse(raw, &ctx())
    }

    #[test]
    fn parses_json_reply_with_aliases() {
        let parsed = parse(
            r#"```json
            {"station_name": "Shell", "date": "03/02/2025", "gallons": "10.5",
             "unit_price": 3.459, "total": "$36.32", "grade": "Regular", "confidence": 0.92}
            ```"#,
        );
        assert!(parsed.usable);
        assert!(parsed.notes.is_empty());
        let d = parsed.data;
        assert_eq!(d.vendor_name.as_deref(), Some("Shell"));
        assert_eq!(d.date.as_deref(), Some("2025-03-02"));
        assert_eq!(d.gallons, Some(10.5));
        assert_eq!(d.price_per_gallon, Some(3.459));
        assert_eq!(d.total_amount, Some(36.32));
        assert_eq!(d.fuel_grade.as_deref(), Some("regular"));
        assert_eq!(d.confidence, Some(0.92));
    }

    #[test]
    fn scrapes_plain_text_reply() {
        let parsed = parse("PUMP 04  12.345 GAL @ $3.299/GAL  TOTAL SALE $40.73  01/15/2025");
        assert!(parsed.usable);
        assert_eq!(parsed.notes.len(), 1);
        assert_eq!(parsed.data.gallons, Some(12.345));
        assert_eq!(parsed.data.price_per_gallon, Some(3.299));
        assert_eq!(parsed.data.total_amount, Some(40.73));
        assert_eq!(parsed.data.date.as_deref(), Some("2025-01-15"));
    }

    #[test]
    fn unreadable_reply_is_unusable() {
        let parsed = parse("I cannot read this image.");
        assert!(!parsed.usable);
        assert_eq!(parsed.data.gallons, None);
    }

    #[tokio::test]
    async fn validation_bounds_and_mismatch() {
        let p = FuelReceiptProcessor::new();
        let data = FuelReceiptData {
            gallons: Some(10.0),
            price_per_gallon: Some(3.0),
            total_amount: Some(45.0),
            ..FuelReceiptData::default()
        };
        let v = p.validate(&data, &ctx()).await;
        assert!(v.valid);
        assert!(v.warnings.iter().any(|w| w.contains("differs")));

        let bad = FuelReceiptData {
            gallons: Some(150.0),
            price_per_gallon: Some(0.0),
            total_amount: Some(-1.0),
            ..FuelReceiptData::default()
        };
        let v = p.validate(&bad, &ctx()).await;
        assert!(!v.valid);
        assert_eq!(v.errors.len(), 3);
    }

    #[tokio::test]
    async fn future_date_is_warning() {
        let p = FuelReceiptProcessor::new();
        let data = FuelReceiptData {
            gallons: Some(10.0),
            total_amount: Some(30.0),
            date: Some("2999-01-01".to_string()),
            ..FuelReceiptData::default()
        };
        let v = p.validate(&data, &ctx()).await;
        assert!(v.valid);
        assert!(v.warnings.iter().any(|w| w.contains("future")));
    }

    #[tokio::test]
    async fn enrichment_derives_missing_value() {
        let p = FuelReceiptProcessor::new();
        let data = FuelReceiptData {
            gallons: Some(10.0),
            total_amount: Some(34.59),
            ..FuelReceiptData::default()
        };
        let Ok(Some(enriched)) = p.enrich(&data, &ctx()).await else {
            panic!("enrichment expected");
        };
        assert_eq!(enriched.price_per_gallon, Some(3.459));
        assert_eq!(enriched.derived_fields, vec!["price_per_gallon".to_string()]);

        let complete = FuelReceiptData {
            price_per_gallon: Some(3.459),
            ..data
        };
        assert!(matches!(p.enrich(&complete, &ctx()).await, Ok(None)));
    }

    #[test]
    fn format_line() {
        let data = FuelReceiptData {
            vendor_name: Some("Shell Station".to_string()),
            gallons: Some(10.0),
            price_per_gallon: Some(3.459),
            total_amount: Some(34.59),
            ..FuelReceiptData::default()
        };
        assert_eq!(
            FuelReceiptProcessor::new().format(&data).as_deref(),
            Some("Shell - 10.000 gal @ $3.459/gal = $34.59")
        );
    }

    #[test]
    fn prompt_is_deterministic() {
        let p = FuelReceiptProcessor::new();
        assert_eq!(p.prompt(&ctx()), p.prompt(&ctx()));
    }
}
