//! Service invoice processor.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::reply::{Reply, parse_date, scrape_number};
use super::{DocumentProcessor, Parsed, round_to};
use crate::domain::{DocumentType, ProcessingContext, ValidationResult};
use crate::enrichment::EnrichmentError;
use crate::insight::normalize_vendor_name;
use crate::insight::summary::{format_amount, format_miles};

/// Relative gap between the line-item sum and the total that is reported.
/// Taxes and shop fees usually explain smaller gaps.
pub const LINE_SUM_TOLERANCE: f64 = 0.15;

/// Keyword table for service categorisation, checked in order.
const CATEGORY_KEYWORDS: [(&str, &[&str]); 10] = [
    ("oil_change", &["oil", "lube"]),
    ("tires", &["tire", "tyre", "rotation", "alignment", "balanc"]),
    ("brakes", &["brake", "rotor", "caliper", "pads"]),
    ("battery", &["battery"]),
    ("filters", &["filter"]),
    ("fluids", &["coolant", "flush", "transmission fluid", "brake fluid"]),
    ("inspection", &["inspection", "emission", "smog"]),
    ("engine", &["spark plug", "timing belt", "engine", "serpentine"]),
    ("electrical", &["alternator", "starter", "fuse", "bulb", "headlight"]),
    ("climate", &["a/c", "air conditioning", "hvac", "refrigerant"]),
];

static TOTAL_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:grand total|total due|amount due|total)\D{0,12}?\$?\s*(\d{1,5}(?:,\d{3})*\.\d{2})").ok()
});
static MILES_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:mileage|odometer|miles in|miles)\D{0,10}?(\d{1,3}(?:,\d{3})+|\d{3,7})").ok()
});

/// One billed line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Work or part description.
    pub description: String,
    /// Line amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

/// Fields extracted from a shop invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInvoiceData {
    /// Shop name as printed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    /// Invoice date, `YYYY-MM-DD` when recognized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Odometer at service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub miles: Option<f64>,
    /// Invoice total.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    /// Headline service, e.g. "Oil change".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    /// Billed lines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub line_items: Vec<LineItem>,
    /// Model-reported confidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Categories derived from the service type and lines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_categories: Vec<String>,
}

impl ServiceInvoiceData {
    /// Sum of line amounts, when every line has one.
    #[must_use]
    pub fn line_sum(&self) -> Option<f64> {
        if self.line_items.is_empty() {
            return None;
        }
        self.line_items
            .iter()
            .map(|item| item.amount)
            .sum::<Option<f64>>()
            .map(|sum| round_to(sum, 2))
    }
}

/// Categorises free text against the keyword table. Returns categories in
/// table order, without duplicates.
#[must_use]
pub fn categorize(text: &str) -> Vec<String> {
    let text = text.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(category, _)| (*category).to_string())
        .collect()
}

/// Extracts totals, mileage and line items from shop invoices.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceInvoiceProcessor;

impl ServiceInvoiceProcessor {
    /// Creates the processor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentProcessor for ServiceInvoiceProcessor {
    type Data = ServiceInvoiceData;

    fn document_type(&self) -> DocumentType {
        DocumentType::ServiceInvoice
    }

    fn version(&self) -> &'static str {
        "1.1.0"
    }

    fn prompt(&self, _context: &ProcessingContext) -> String {
        "You are reading a vehicle service or repair invoice. \
         Reply with a single JSON object and nothing else, using these keys: \
         business_name, date (YYYY-MM-DD), miles (odometer at service, number), \
         total_amount (number, dollars), service_type (short headline such as \"Oil change\"), \
         line_items (array of {\"description\": string, \"amount\": number}), \
         confidence (0 to 1). Use null for anything you cannot read."
            .to_string()
    }

    fn parse(&self, raw_text: &str, _context: &ProcessingContext) -> Parsed<ServiceInvoiceData> {
        let reply = Reply::parse(raw_text);
        let mut notes = Vec::new();

        let data = if reply.has_json() {
            let line_items = reply
                .object_list(&["line_items", "items", "services"])
                .into_iter()
                .filter_map(|item| {
                    let description = item
                        .get("description")
                        .or_else(|| item.get("name"))
                        .and_then(|v| v.as_str())
                        .map(str::trim)
                        .filter(|s| !s.is_empty())?
                        .to_string();
                    let amount = item
                        .get("amount")
                        .or_else(|| item.get("price"))
                        .and_then(crate::insight::lookup::as_number);
                    Some(LineItem { description, amount })
                })
                .collect();
            ServiceInvoiceData {
                business_name: reply.text_field(&["business_name", "shop_name", "vendor_name"]),
                date: reply.text_field(&["date", "invoice_date"]).map(|text| {
                    parse_date(&text).map_or(text, |d| d.format("%Y-%m-%d").to_string())
                }),
                miles: reply.number(&["miles", "mileage", "odometer"]),
                total_amount: reply.number(&["total_amount", "total", "amount_due"]),
                service_type: reply.text_field(&["service_type", "service"]),
                line_items,
                confidence: reply.confidence(),
                service_categories: Vec::new(),
            }
        } else {
            notes.push("model reply was not JSON; values scraped from text".to_string());
            ServiceInvoiceData {
                total_amount: scrape_number(TOTAL_RE.as_ref(), reply.text()),
                miles: scrape_number(MILES_RE.as_ref(), reply.text()),
                ..ServiceInvoiceData::default()
            }
        };

        let usable = data.total_amount.is_some() || !data.line_items.is_empty();
        Parsed { data, usable, notes }
    }

    async fn validate(&self, data: &ServiceInvoiceData, _context: &ProcessingContext) -> ValidationResult {
        let mut v = ValidationResult::ok();

        if let Some(total) = data.total_amount
            && total < 0.0
        {
            v.add_error(format!("total amount {total} is negative"));
        }
        for item in &data.line_items {
            if let Some(amount) = item.amount
                && amount < 0.0
                && !item.description.to_lowercase().contains("discount")
            {
                v.add_error(format!("line '{}' has negative amount {amount}", item.description));
            }
        }
        if let Some(miles) = data.miles
            && miles < 0.0
        {
            v.add_error(format!("mileage {miles} is negative"));
        }

        match (data.total_amount, data.line_sum()) {
            (None, None) if data.line_items.is_empty() => {
                v.add_error("no total amount or line items found");
            }
            (None, Some(sum)) => {
                v.add_warning(format!("total missing; line items sum to {}", format_amount(sum)));
            }
            (Some(total), Some(sum)) if total > 0.0 && ((sum - total) / total).abs() > LINE_SUM_TOLERANCE => {
                v.add_warning(format!(
                    "line items sum to {} but total is {}",
                    format_amount(sum),
                    format_amount(total)
                ));
            }
            _ => {}
        }

        if let Some(date) = data.date.as_deref()
            && parse_date(date).is_none()
        {
            v.add_warning(format!("date '{date}' not recognized"));
        }
        v
    }

    fn supports_enrichment(&self) -> bool {
        true
    }

    async fn enrich(
        &self,
        data: &ServiceInvoiceData,
        _context: &ProcessingContext,
    ) -> Result<Option<ServiceInvoiceData>, EnrichmentError> {
        let mut text = data.service_type.clone().unwrap_or_default();
        for item in &data.line_items {
            text.push(' ');
            text.push_str(&item.description);
        }
        if text.trim().is_empty() {
            return Ok(None);
        }
        let mut categories = categorize(&text);
        if categories.is_empty() {
            categories.push("other".to_string());
        }
        Ok(Some(ServiceInvoiceData {
            service_categories: categories,
            ..data.clone()
        }))
    }

    fn format(&self, data: &ServiceInvoiceData) -> Option<String> {
        let mut head = vec![
            data.business_name
                .as_deref()
                .map_or_else(|| "Service".to_string(), normalize_vendor_name),
        ];
        if let Some(service) = &data.service_type {
            head.push(service.clone());
        }
        if let Some(total) = data.total_amount {
            head.push(format_amount(total));
        }
        if let Some(miles) = data.miles {
            head.push(format!("{} mi", format_miles(miles)));
        }
        let mut lines = vec![head.join(" - ")];
        for item in &data.line_items {
            match item.amount {
                Some(amount) => lines.push(format!("  {}: {}", item.description, format_amount(amount))),
                None => lines.push(format!("  {}", item.description)),
            }
        }
        Some(lines.join("\n"))
    }
}
