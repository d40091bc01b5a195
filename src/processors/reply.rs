//! Tolerant reading of raw vision-model replies.
//!
//! Models are asked for a JSON object but often wrap it in prose or a
//! fenced code block, quote numbers, or reply in plain text. [`Reply`]
//! locates the first well-formed JSON object in the text and offers
//! alias-aware field readers; processors fall back to scraping
//! [`Reply::text`] when no object is present.

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Value};

use crate::insight::lookup::{as_number, parse_numeric_text};

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%m-%d-%Y", "%b %d, %Y"];

/// A raw model reply with its embedded JSON object, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    object: Option<Map<String, Value>>,
    text: String,
}

impl Reply {
    /// Parses a raw reply. Never fails.
    #[must_use]
    pub fn parse(raw_text: &str) -> Self {
        Self {
            object: extract_json_object(raw_text),
            text: raw_text.to_string(),
        }
    }

    /// `true` when a JSON object was found.
    #[must_use]
    pub const fn has_json(&self) -> bool {
        self.object.is_some()
    }

    /// The raw reply text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// First alias holding a non-null value.
    #[must_use]
    pub fn value(&self, aliases: &[&str]) -> Option<&Value> {
        let object = self.object.as_ref()?;
        aliases
            .iter()
            .filter_map(|key| object.get(*key))
            .find(|v| !v.is_null())
    }

    /// First alias holding a number or numeric string.
    #[must_use]
    pub fn number(&self, aliases: &[&str]) -> Option<f64> {
        let object = self.object.as_ref()?;
        aliases
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(as_number)
    }

    /// First alias holding a non-blank string (numbers are stringified).
    #[must_use]
    pub fn text_field(&self, aliases: &[&str]) -> Option<String> {
        let object = self.object.as_ref()?;
        aliases
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }

    /// First alias holding an array; string items are collected, blanks
    /// dropped. A comma-separated string is accepted too.
    #[must_use]
    pub fn string_list(&self, aliases: &[&str]) -> Option<Vec<String>> {
        let value = self.value(aliases)?;
        match value {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            Value::String(s) => Some(
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            _ => None,
        }
    }

    /// First alias holding an array of objects.
    #[must_use]
    pub fn object_list(&self, aliases: &[&str]) -> Vec<&Map<String, Value>> {
        self.value(aliases)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_object).collect())
            .unwrap_or_default()
    }

    /// A model-reported confidence in `[0, 1]`.
    #[must_use]
    pub fn confidence(&self) -> Option<f64> {
        self.number(&["confidence", "overall_confidence"])
            .filter(|c| (0.0..=1.0).contains(c))
    }
}

/// Returns the first balanced `{ ... }` span in `text` that parses as a
/// JSON object. Braces inside JSON strings are skipped.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let mut search_from = 0;
    while let Some(offset) = text.get(search_from..).and_then(|rest| rest.find('{')) {
        let start = search_from + offset;
        if let Some(end) = matching_brace(text, start)
            && let Some(candidate) = text.get(start..=end)
            && let Ok(Value::Object(object)) = serde_json::from_str::<Value>(candidate)
        {
            return Some(object);
        }
        search_from = start + 1;
    }
    None
}

/// First capture group of `pattern` in `text`, read as a number.
/// A pattern that failed to compile never matches.
#[must_use]
pub fn scrape_number(pattern: Option<&Regex>, text: &str) -> Option<f64> {
    pattern?
        .captures(text)?
        .get(1)
        .and_then(|m| parse_numeric_text(m.as_str()))
}

/// First capture group of `pattern` in `text`, trimmed.
#[must_use]
pub fn scrape_text(pattern: Option<&Regex>, text: &str) -> Option<String> {
    let capture = pattern?.captures(text)?.get(1)?;
    let trimmed = capture.as_str().trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parses a receipt date in one of the common printed formats.
#[must_use]
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
}

/// Byte index of the `}` closing the `{` at `start`.
fn matching_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text.get(start..)?.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn finds_object_in_fenced_block() {
        let raw = "Here is the data:\n```json\n{\"gallons\": \"10.5\", \"vendor_name\": \"Shell\"}\n```";
        let reply = Reply::parse(raw);
        assert!(reply.has_json());
        assert_eq!(reply.number(&["gallons"]), Some(10.5));
        assert_eq!(reply.text_field(&["vendor_name"]).as_deref(), Some("Shell"));
    }

    #[test]
    fn skips_braces_inside_strings_and_bad_candidates() {
        let raw = r#"note {not json} then {"memo": "a } brace", "total": 3}"#;
        let Some(object) = extract_json_object(raw) else {
            panic!("object expected");
        };
        assert_eq!(object.get("total"), Some(&Value::from(3)));
    }

    #[test]
    fn nested_objects_are_kept_whole() {
        let raw = r#"{"validation": {"rollup": "ok"}, "odometer_miles": 1200}"#;
        let reply = Reply::parse(raw);
        assert!(reply.value(&["validation"]).is_some_and(Value::is_object));
        assert_eq!(reply.number(&["odometer_miles"]), Some(1200.0));
    }

    #[test]
    fn plain_text_has_no_json() {
        let reply = Reply::parse("The odometer shows 45,210 miles.");
        assert!(!reply.has_json());
        assert_eq!(reply.number(&["miles"]), None);
        assert_eq!(reply.text(), "The odometer shows 45,210 miles.");
    }

    #[test]
    fn unterminated_object_is_ignored() {
        assert!(extract_json_object("{\"a\": 1").is_none());
        assert!(extract_json_object("").is_none());
    }

    #[test]
    fn aliases_and_lists() {
        let reply = Reply::parse(
            r#"{"station": "", "station_name": "BP", "lights": "tpms, abs", "items": [{"d": 1}, 2]}"#,
        );
        assert_eq!(reply.text_field(&["station", "station_name"]).as_deref(), Some("BP"));
        assert_eq!(
            reply.string_list(&["lights"]),
            Some(vec!["tpms".to_string(), "abs".to_string()])
        );
        assert_eq!(reply.object_list(&["items"]).len(), 1);
    }

    #[test]
    fn scraping_and_dates() {
        let re = Regex::new(r"(?i)([\d,]+(?:\.\d+)?)\s*mi").ok();
        assert_eq!(scrape_number(re.as_ref(), "reads 45,210 mi"), Some(45210.0));
        assert_eq!(scrape_number(None, "reads 45,210 mi"), None);
        assert_eq!(
            parse_date("03/15/2025").map(|d| d.to_string()).as_deref(),
            Some("2025-03-15")
        );
        assert_eq!(
            parse_date("Mar 15, 2025").map(|d| d.to_string()).as_deref(),
            Some("2025-03-15")
        );
        assert!(parse_date("yesterday").is_none());
    }

    #[test]
    fn confidence_must_be_unit_range() {
        assert_eq!(Reply::parse(r#"{"confidence": 0.8}"#).confidence(), Some(0.8));
        assert_eq!(Reply::parse(r#"{"confidence": 80}"#).confidence(), None);
    }
}
