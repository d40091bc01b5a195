//! Dashboard snapshot processor with gauge-reference prompting.
//!
//! A single cluster photo yields odometer, fuel level, range and warning
//! lights. Fuel needles are hard to read without knowing the gauge, so the
//! prompt carries whatever reference the caller supplies in metadata:
//!
//! - `fuel_gauge_reference`: free text or an object describing the gauge
//! - `vehicle`: year/make/model, to anchor the cluster layout
//! - `last_odometer_miles`: the odometer cannot read lower than this
//!
//! Parsing computes a `validation` block with per-gauge confidences and a
//! rollup verdict, which downstream confidence scoring consumes.

use std::fmt::Write as _;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::odometer::{LAST_ODOMETER_KEY, MAX_ODOMETER_MILES, scrape_reading};
use super::reply::{Reply, scrape_number};
use super::{DocumentProcessor, Parsed, round_to};
use crate::domain::{DocumentType, ProcessingContext, ValidationResult};
use crate::insight::confidence::WARNING_THRESHOLD;
use crate::insight::lookup::{as_number, parse_numeric_text};
use crate::insight::summary::format_miles;

/// Metadata key for the gauge description.
pub const GAUGE_REFERENCE_KEY: &str = "fuel_gauge_reference";
/// Metadata key for the vehicle description.
pub const VEHICLE_KEY: &str = "vehicle";

static FUEL_PERCENT_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)fuel\D{0,12}?(\d{1,3}(?:\.\d+)?)\s*%").ok());
static RANGE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)range\D{0,12}?(\d{1,4})\s*(?:mi|miles)\b").ok());

/// Verdict over the individual gauge checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rollup {
    /// Every reading present and confidently read.
    Ok,
    /// Something was read but needs a human look.
    #[default]
    NeedsReview,
    /// Nothing usable was read.
    Failed,
}

/// Per-gauge confidences and the rollup verdict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardValidation {
    /// Rollup verdict.
    pub rollup: Rollup,
    /// Odometer read confidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub odometer_conf: Option<f64>,
    /// Fuel needle read confidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel_conf: Option<f64>,
    /// Warning light read confidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lights_conf: Option<f64>,
}

/// Fields extracted from a dashboard photo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshotData {
    /// Odometer, in miles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub odometer_miles: Option<f64>,
    /// Fuel level as a fraction of a full tank.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel_level: Option<f64>,
    /// Remaining range, in miles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_miles: Option<f64>,
    /// Lit warning lights, snake_case.
    #[serde(default)]
    pub warning_lights: Vec<String>,
    /// Outside temperature, Fahrenheit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outside_temp_f: Option<f64>,
    /// Gauge confidences and rollup.
    pub validation: DashboardValidation,
    /// Model-reported overall confidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Reads full instrument clusters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DashboardSnapshotProcessor;

impl DashboardSnapshotProcessor {
    /// Creates the processor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Reads a fuel level as a fraction: `0.25`, `25`, `"25%"`, `"1/4"`,
/// `"half"`, `"F"`, `"E"`. Numbers above 1 are percentages.
#[must_use]
pub fn parse_fuel_level(value: &Value) -> Option<f64> {
    if let Some(n) = value.as_f64() {
        return Some(if n > 1.0 { n / 100.0 } else { n });
    }
    let text = value.as_str()?.trim().to_lowercase();
    match text.as_str() {
        "f" | "full" => return Some(1.0),
        "e" | "empty" => return Some(0.0),
        "half" => return Some(0.5),
        _ => {}
    }
    if let Some(percent) = text.strip_suffix('%') {
        return parse_numeric_text(percent).map(|p| p / 100.0);
    }
    if let Some((num, den)) = text.split_once('/') {
        let num = parse_numeric_text(num)?;
        let den = parse_numeric_text(den).filter(|d| *d > 0.0)?;
        return Some(num / den);
    }
    parse_numeric_text(&text).map(|n| if n > 1.0 { n / 100.0 } else { n })
}

fn normalize_light(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn gauge_confidence(reply: &Reply, nested: Option<&Map<String, Value>>, keys: &[&str]) -> Option<f64> {
    reply
        .number(keys)
        .or_else(|| {
            let nested = nested?;
            keys.iter().filter_map(|k| nested.get(*k)).find_map(as_number)
        })
        .filter(|c| (0.0..=1.0).contains(c))
}

fn rollup(data: &DashboardSnapshotData, last_odometer: Option<f64>) -> Rollup {
    if data.odometer_miles.is_none() && data.fuel_level.is_none() {
        return Rollup::Failed;
    }
    let v = &data.validation;
    let low_confidence = [v.odometer_conf, v.fuel_conf, v.lights_conf]
        .into_iter()
        .flatten()
        .any(|c| c < WARNING_THRESHOLD);
    let fuel_out_of_range = data.fuel_level.is_some_and(|f| !(0.0..=1.0).contains(&f));
    let odometer_regressed = matches!(
        (data.odometer_miles, last_odometer),
        (Some(miles), Some(last)) if miles < last
    );
    if data.odometer_miles.is_none()
        || data.fuel_level.is_none()
        || low_confidence
        || fuel_out_of_range
        || odometer_regressed
    {
        Rollup::NeedsReview
    } else {
        Rollup::Ok
    }
}

#[async_trait]
impl DocumentProcessor for DashboardSnapshotProcessor {
    type Data = DashboardSnapshotData;

    fn document_type(&self) -> DocumentType {
        DocumentType::DashboardSnapshot
    }

    fn version(&self) -> &'static str {
        "2.0.0"
    }

    fn prompt(&self, context: &ProcessingContext) -> String {
        let mut prompt = String::from(
            "You are reading a photo of a vehicle instrument cluster. \
             Reply with a single JSON object and nothing else, using these keys: \
             odometer_miles (number), fuel_level (fraction of a full tank, 0 to 1), \
             range_miles (number or null), warning_lights (array of names of lit warning lights), \
             outside_temp_f (number or null), odometer_conf, fuel_conf, lights_conf \
             (each 0 to 1, how sure you are of that reading), confidence (0 to 1 overall).",
        );
        if let Some(vehicle) = context.metadata_text(VEHICLE_KEY) {
            let _ = write!(prompt, "\nVehicle: {vehicle}.");
        }
        match context.metadata.get(GAUGE_REFERENCE_KEY) {
            Some(Value::String(reference)) if !reference.trim().is_empty() => {
                let _ = write!(prompt, "\nFuel gauge reference: {}.", reference.trim());
            }
            Some(Value::Object(reference)) => {
                let mut marks: Vec<String> = reference
                    .iter()
                    .map(|(mark, meaning)| match meaning {
                        Value::String(s) => format!("{mark} = {s}"),
                        other => format!("{mark} = {other}"),
                    })
                    .collect();
                marks.sort();
                let _ = write!(prompt, "\nFuel gauge reference: {}.", marks.join(", "));
            }
            _ => prompt.push_str(
                "\nIf the fuel gauge is a needle, E is empty (0) and F is full (1); \
                 estimate the fraction between the marks.",
            ),
        }
        if let Some(last) = context.metadata_number(LAST_ODOMETER_KEY) {
            let _ = write!(
                prompt,
                "\nThe previous recorded odometer was {} miles; it cannot be lower.",
                format_miles(last)
            );
        }
        prompt
    }

    fn parse(&self, raw_text: &str, context: &ProcessingContext) -> Parsed<DashboardSnapshotData> {
        let reply = Reply::parse(raw_text);
        let mut notes = Vec::new();

        let mut data = if reply.has_json() {
            let nested = reply.value(&["validation"]).and_then(Value::as_object);
            let outside_temp_f = reply.number(&["outside_temp_f", "outside_temp", "temperature_f"]).or_else(|| {
                reply
                    .number(&["outside_temp_c", "temperature_c"])
                    .map(|c| round_to(c * 9.0 / 5.0 + 32.0, 1))
            });
            DashboardSnapshotData {
                odometer_miles: reply.number(&["odometer_miles", "odometer", "miles"]),
                fuel_level: reply
                    .value(&["fuel_level", "fuel", "fuel_gauge"])
                    .and_then(parse_fuel_level),
                range_miles: reply.number(&["range_miles", "range"]),
                warning_lights: reply
                    .string_list(&["warning_lights", "lights"])
                    .unwrap_or_default()
                    .iter()
                    .map(String::as_str)
                    .map(normalize_light)
                    .filter(|l| !l.is_empty() && l != "none")
                    .collect(),
                outside_temp_f,
                validation: DashboardValidation {
                    odometer_conf: gauge_confidence(&reply, nested, &["odometer_conf", "odometer_confidence"]),
                    fuel_conf: gauge_confidence(&reply, nested, &["fuel_conf", "fuel_confidence"]),
                    lights_conf: gauge_confidence(&reply, nested, &["lights_conf", "lights_confidence"]),
                    ..DashboardValidation::default()
                },
                confidence: reply.confidence(),
            }
        } else {
            notes.push("model reply was not JSON; readings scraped from text".to_string());
            let text = reply.text();
            DashboardSnapshotData {
                odometer_miles: scrape_reading(text).map(|(reading, unit)| unit.to_miles(reading)),
                fuel_level: scrape_number(FUEL_PERCENT_RE.as_ref(), text).map(|p| p / 100.0),
                range_miles: scrape_number(RANGE_RE.as_ref(), text),
                ..DashboardSnapshotData::default()
            }
        };

        data.validation.rollup = rollup(&data, context.metadata_number(LAST_ODOMETER_KEY));
        let usable = data.validation.rollup != Rollup::Failed;
        Parsed { data, usable, notes }
    }

    async fn validate(&self, data: &DashboardSnapshotData, context: &ProcessingContext) -> ValidationResult {
        let mut v = ValidationResult::ok();
        match data.validation.rollup {
            Rollup::Failed => v.add_error("no gauge could be read"),
            Rollup::NeedsReview => v.add_warning("dashboard readings need review"),
            Rollup::Ok => {}
        }
        if let Some(level) = data.fuel_level
            && !(0.0..=1.0).contains(&level)
        {
            v.add_error(format!("fuel level {level} outside [0, 1]"));
        }
        if let Some(miles) = data.odometer_miles {
            if !(0.0..=MAX_ODOMETER_MILES).contains(&miles) {
                v.add_error(format!("odometer {} mi out of range", format_miles(miles)));
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
        }
        if let Some(range) = data.range_miles
            && range < 0.0
        {
            v.add_error(format!("range {range} is negative"));
        }
        v
    }

    fn format(&self, data: &DashboardSnapshotData) -> Option<String> {
        let mut parts = vec!["Dashboard".to_string()];
        if let Some(miles) = data.odometer_miles {
            parts.push(format!("{} mi", format_miles(miles)));
        }
        if let Some(level) = data.fuel_level {
            parts.push(format!("fuel {:.0}%", (level * 100.0).clamp(0.0, 100.0)));
        }
        if let Some(range) = data.range_miles {
            parts.push(format!("range {} mi", format_miles(range)));
        }
        if !data.warning_lights.is_empty() {
            let noun = if data.warning_lights.len() == 1 { "light" } else { "lights" };
            parts.push(format!(
                "{} warning {noun} ({})",
                data.warning_lights.len(),
                data.warning_lights.join(", ")
            ));
        }
        if let Some(temp) = data.outside_temp_f {
            parts.push(format!("{temp:.0}°F"));
        }
        Some(parts.join(" - "))
    }
}
