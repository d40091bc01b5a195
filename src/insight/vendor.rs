//! Vendor name resolution and display normalization.

use serde_json::Value;

use super::lookup::{FieldPath, first_text};

/// Vendor precedence: first non-empty string wins.
pub const VENDOR_PATHS: [FieldPath; 6] = [
    FieldPath::new(&["vendor_name"]),
    FieldPath::new(&["extracted_data", "vendor_name"]),
    FieldPath::new(&["station_name"]),
    FieldPath::new(&["extracted_data", "station_name"]),
    FieldPath::new(&["business_name"]),
    FieldPath::new(&["extracted_data", "business_name"]),
];

/// Legal-entity suffixes removed during normalization.
const LEGAL_SUFFIXES: [&str; 8] = [
    "llc",
    "inc",
    "corp",
    "corporation",
    "ltd",
    "limited",
    "co",
    "company",
];

/// Generic business-category words removed during normalization.
const CATEGORY_WORDS: [&str; 8] = [
    "automotive",
    "auto",
    "service",
    "services",
    "repair",
    "shop",
    "center",
    "station",
];

/// Characters left dangling at either end once words are removed.
const DANGLING: &[char] = &[',', '&', '-', '/', '|', ';', ':'];

/// Returns the raw vendor name from the first populated location, trimmed.
#[must_use]
pub fn raw_vendor(payload: &Value) -> Option<&str> {
    first_text(payload, &VENDOR_PATHS)
}

/// Resolves and normalizes the vendor name of a payload.
///
/// `None` means the payload names no vendor, which is a valid display
/// state: callers simply omit the vendor clause.
#[must_use]
pub fn resolve_vendor(payload: &Value) -> Option<String> {
    raw_vendor(payload).map(normalize_vendor_name)
}

/// Strips legal suffixes and category words (whole words,
/// case-insensitive), collapses whitespace and trims.
///
/// When nothing would remain, the trimmed original is returned instead so
/// a non-empty source never normalizes to an empty string. Idempotent.
#[must_use]
pub fn normalize_vendor_name(name: &str) -> String {
    // Trimming dangling punctuation can expose another strippable word
    // ("Foo Auto-"), so strip to a fixpoint. Each pass shrinks or stops.
    let mut current = strip_once(name);
    loop {
        let next = strip_once(&current);
        if next == current {
            break;
        }
        current = next;
    }

    if current.is_empty() {
        name.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        current
    }
}

fn strip_once(name: &str) -> String {
    let kept: Vec<&str> = name
        .split_whitespace()
        .filter(|token| !is_strippable(token))
        .collect();
    kept.join(" ")
        .trim_matches(|c: char| c.is_whitespace() || DANGLING.contains(&c))
        .to_string()
}

/// A token is strippable when, ignoring a trailing `.` or `,` and case,
/// it is a legal suffix or a category word.
fn is_strippable(token: &str) -> bool {
    let core = token.trim_end_matches(['.', ',']).to_ascii_lowercase();
    LEGAL_SUFFIXES.contains(&core.as_str()) || CATEGORY_WORDS.contains(&core.as_str())
}
