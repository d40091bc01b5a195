//! Ordered field lookups over untyped event payloads.
//!
//! The same logical field may live at the top level of a payload, under
//! `extracted_data`, or under `data`, depending on which code path wrote
//! the event. Every logical field gets an explicit, ordered list of
//! [`FieldPath`]s and a named accessor that returns the first present and
//! valid value. Accessors never fail: absence is `None`.

use serde_json::Value;

/// A path of object keys from the payload root, e.g. `extracted_data.gallons`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPath(&'static [&'static str]);

impl FieldPath {
    /// Creates a path from its key segments.
    #[must_use]
    pub const fn new(segments: &'static [&'static str]) -> Self {
        Self(segments)
    }

    /// Returns the key segments.
    #[must_use]
    pub const fn segments(&self) -> &'static [&'static str] {
        self.0
    }

    /// Follows the path through nested objects. Any non-object on the way
    /// resolves to `None`.
    #[must_use]
    pub fn resolve<'a>(&self, payload: &'a Value) -> Option<&'a Value> {
        self.0
            .iter()
            .try_fold(payload, |node, key| node.get(*key))
            .filter(|v| !v.is_null())
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Reads a JSON number, or a numeric string such as `"34.59"`,
/// `"$1,234.50"` or `" 12 "`. Non-finite values are rejected.
#[must_use]
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_numeric_text(s),
        _ => None,
    }
}

/// Reads a JSON number only. Strings are not coerced.
#[must_use]
pub fn as_strict_number(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

/// Parses free-form numeric text: optional currency sign, thousands
/// separators and surrounding whitespace are tolerated.
#[must_use]
pub fn parse_numeric_text(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Returns the first value in `paths` that reads as a number (lenient).
#[must_use]
pub fn first_number(payload: &Value, paths: &[FieldPath]) -> Option<f64> {
    paths
        .iter()
        .filter_map(|path| path.resolve(payload))
        .find_map(as_number)
}

/// Returns the first value in `paths` that is a JSON number (strict).
#[must_use]
pub fn first_strict_number(payload: &Value, paths: &[FieldPath]) -> Option<f64> {
    paths
        .iter()
        .filter_map(|path| path.resolve(payload))
        .find_map(as_strict_number)
}

/// Returns the first value in `paths` that is a non-blank string,
/// trimmed.
#[must_use]
pub fn first_text<'a>(payload: &'a Value, paths: &[FieldPath]) -> Option<&'a str> {
    paths
        .iter()
        .filter_map(|path| path.resolve(payload))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Amount precedence: `total_amount`, `extracted_data.total_amount`,
/// `amount`, `extracted_data.amount`.
pub const AMOUNT_PATHS: [FieldPath; 4] = [
    FieldPath::new(&["total_amount"]),
    FieldPath::new(&["extracted_data", "total_amount"]),
    FieldPath::new(&["amount"]),
    FieldPath::new(&["extracted_data", "amount"]),
];

/// Gallons precedence.
pub const GALLONS_PATHS: [FieldPath; 3] = [
    FieldPath::new(&["gallons"]),
    FieldPath::new(&["extracted_data", "gallons"]),
    FieldPath::new(&["data", "gallons"]),
];

/// Price-per-gallon precedence.
pub const PRICE_PER_GALLON_PATHS: [FieldPath; 3] = [
    FieldPath::new(&["price_per_gallon"]),
    FieldPath::new(&["extracted_data", "price_per_gallon"]),
    FieldPath::new(&["data", "price_per_gallon"]),
];

/// Odometer miles precedence.
pub const MILES_PATHS: [FieldPath; 6] = [
    FieldPath::new(&["miles"]),
    FieldPath::new(&["extracted_data", "miles"]),
    FieldPath::new(&["odometer_miles"]),
    FieldPath::new(&["extracted_data", "odometer_miles"]),
    FieldPath::new(&["data", "odometer_miles"]),
    FieldPath::new(&["data", "miles"]),
];

/// Fuel level (fraction of a full tank) precedence.
pub const FUEL_LEVEL_PATHS: [FieldPath; 3] = [
    FieldPath::new(&["fuel_level"]),
    FieldPath::new(&["extracted_data", "fuel_level"]),
    FieldPath::new(&["data", "fuel_level"]),
];

/// Warning-light list precedence.
pub const WARNING_LIGHTS_PATHS: [FieldPath; 3] = [
    FieldPath::new(&["warning_lights"]),
    FieldPath::new(&["extracted_data", "warning_lights"]),
    FieldPath::new(&["data", "warning_lights"]),
];

/// Service type precedence.
pub const SERVICE_TYPE_PATHS: [FieldPath; 4] = [
    FieldPath::new(&["service_type"]),
    FieldPath::new(&["extracted_data", "service_type"]),
    FieldPath::new(&["service_category"]),
    FieldPath::new(&["extracted_data", "service_category"]),
];

/// Free-text description precedence.
pub const DESCRIPTION_PATHS: [FieldPath; 4] = [
    FieldPath::new(&["description"]),
    FieldPath::new(&["extracted_data", "description"]),
    FieldPath::new(&["notes"]),
    FieldPath::new(&["extracted_data", "notes"]),
];

/// Inspection result precedence (`passed` boolean or `result` text).
pub const INSPECTION_RESULT_PATHS: [FieldPath; 4] = [
    FieldPath::new(&["passed"]),
    FieldPath::new(&["extracted_data", "passed"]),
    FieldPath::new(&["result"]),
    FieldPath::new(&["extracted_data", "result"]),
];

/// Insurance provider precedence.
pub const INSURANCE_PROVIDER_PATHS: [FieldPath; 4] = [
    FieldPath::new(&["provider"]),
    FieldPath::new(&["extracted_data", "provider"]),
    FieldPath::new(&["insurer"]),
    FieldPath::new(&["extracted_data", "insurer"]),
];

/// Policy number precedence.
pub const POLICY_NUMBER_PATHS: [FieldPath; 2] = [
    FieldPath::new(&["policy_number"]),
    FieldPath::new(&["extracted_data", "policy_number"]),
];

/// Monetary amount of the event.
#[must_use]
pub fn amount(payload: &Value) -> Option<f64> {
    first_number(payload, &AMOUNT_PATHS)
}

/// Gallons of fuel purchased.
#[must_use]
pub fn gallons(payload: &Value) -> Option<f64> {
    first_number(payload, &GALLONS_PATHS)
}

/// Price per gallon.
#[must_use]
pub fn price_per_gallon(payload: &Value) -> Option<f64> {
    first_number(payload, &PRICE_PER_GALLON_PATHS)
}

/// Odometer reading in miles.
#[must_use]
pub fn miles(payload: &Value) -> Option<f64> {
    first_number(payload, &MILES_PATHS)
}

/// Fuel level as a fraction of a full tank.
#[must_use]
pub fn fuel_level(payload: &Value) -> Option<f64> {
    first_number(payload, &FUEL_LEVEL_PATHS)
}

/// Number of illuminated warning lights, when a list is present.
#[must_use]
pub fn warning_light_count(payload: &Value) -> Option<usize> {
    WARNING_LIGHTS_PATHS
        .iter()
        .filter_map(|path| path.resolve(payload))
        .find_map(Value::as_array)
        .map(Vec::len)
}

/// Service type label (e.g. `"Oil change"`).
#[must_use]
pub fn service_type(payload: &Value) -> Option<&str> {
    first_text(payload, &SERVICE_TYPE_PATHS)
}

/// Free-text description.
#[must_use]
pub fn description(payload: &Value) -> Option<&str> {
    first_text(payload, &DESCRIPTION_PATHS)
}

/// Inspection outcome: `Some(true)` passed, `Some(false)` failed.
#[must_use]
pub fn inspection_passed(payload: &Value) -> Option<bool> {
    INSPECTION_RESULT_PATHS
        .iter()
        .filter_map(|path| path.resolve(payload))
        .find_map(|value| match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "pass" | "passed" | "ok" => Some(true),
                "fail" | "failed" => Some(false),
                _ => None,
            },
            _ => None,
        })
}

/// Insurance provider name.
#[must_use]
pub fn insurance_provider(payload: &Value) -> Option<&str> {
    first_text(payload, &INSURANCE_PROVIDER_PATHS)
}

/// Insurance policy number.
#[must_use]
pub fn policy_number(payload: &Value) -> Option<&str> {
    first_text(payload, &POLICY_NUMBER_PATHS)
}
