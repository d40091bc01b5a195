//! VIN plate processor.
//!
//! VINs are checked against ISO 3779: 17 characters, no `I`, `O` or `Q`,
//! and for North American VINs a check digit in position 9. Model year and
//! manufacturer are decoded locally; an optional [`VinDecoder`] fills in
//! make, model and body class.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::reply::Reply;
use super::{DocumentProcessor, Parsed};
use crate::domain::{DocumentType, ProcessingContext, ValidationResult};
use crate::enrichment::{DecodedVehicle, EnrichmentError, VinDecoder};

/// VIN length.
pub const VIN_LENGTH: usize = 17;

const WEIGHTS: [u32; VIN_LENGTH] = [8, 7, 6, 5, 4, 3, 2, 10, 0, 9, 8, 7, 6, 5, 4, 3, 2];

/// Model-year codes in cycle order, starting at 1980 (and again at 2010).
const YEAR_CODES: &str = "ABCDEFGHJKLMNPRSTVWXY123456789";

/// World manufacturer identifiers, most specific first.
const WMI: [(&str, &str, &str); 24] = [
    ("1HG", "Honda of America", "Honda"),
    ("JHM", "Honda Motor Co.", "Honda"),
    ("1FA", "Ford Motor Company", "Ford"),
    ("1FM", "Ford Motor Company", "Ford"),
    ("1FT", "Ford Motor Company", "Ford"),
    ("1G1", "General Motors", "Chevrolet"),
    ("1GC", "General Motors", "Chevrolet"),
    ("1C4", "FCA US", "Jeep"),
    ("2T1", "Toyota Motor Manufacturing Canada", "Toyota"),
    ("4T1", "Toyota Motor Manufacturing Kentucky", "Toyota"),
    ("5TD", "Toyota Motor Manufacturing Indiana", "Toyota"),
    ("JTD", "Toyota Motor Corporation", "Toyota"),
    ("JN1", "Nissan Motor Co.", "Nissan"),
    ("1N4", "Nissan North America", "Nissan"),
    ("JF1", "Subaru Corporation", "Subaru"),
    ("JF2", "Subaru Corporation", "Subaru"),
    ("4S4", "Subaru of Indiana", "Subaru"),
    ("KMH", "Hyundai Motor Company", "Hyundai"),
    ("KNA", "Kia Corporation", "Kia"),
    ("5YJ", "Tesla, Inc.", "Tesla"),
    ("WBA", "BMW AG", "BMW"),
    ("WVW", "Volkswagen AG", "Volkswagen"),
    ("3VW", "Volkswagen de Mexico", "Volkswagen"),
    ("WDD", "Mercedes-Benz AG", "Mercedes-Benz"),
];

static VIN_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b([A-HJ-NPR-Z0-9]{17})\b").ok());

/// Fields extracted from a VIN plate or sticker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VinData {
    /// The VIN, uppercased with separators removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vin: Option<String>,
    /// Where the VIN was photographed (dashboard, door jamb, title).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Decoded attributes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded: Option<DecodedVehicle>,
    /// Model-reported confidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Reads VIN plates, decoding locally and optionally through a remote
/// decoder.
#[derive(Debug, Clone, Default)]
pub struct VinProcessor {
    decoder: Option<Arc<dyn VinDecoder>>,
}

impl VinProcessor {
    /// A processor that only decodes locally.
    #[must_use]
    pub const fn new() -> Self {
        Self { decoder: None }
    }

    /// A processor that also consults `decoder`.
    #[must_use]
    pub fn with_decoder(decoder: Arc<dyn VinDecoder>) -> Self {
        Self {
            decoder: Some(decoder),
        }
    }
}

fn transliterate(c: char) -> Option<u32> {
    match c {
        '0'..='9' => c.to_digit(10),
        'A' | 'J' => Some(1),
        'B' | 'K' | 'S' => Some(2),
        'C' | 'L' | 'T' => Some(3),
        'D' | 'M' | 'U' => Some(4),
        'E' | 'N' | 'V' => Some(5),
        'F' | 'W' => Some(6),
        'G' | 'P' | 'X' => Some(7),
        'H' | 'Y' => Some(8),
        'R' | 'Z' => Some(9),
        _ => None,
    }
}

/// Computes the ISO 3779 check character for a 17-character VIN.
#[must_use]
pub fn check_digit(vin: &str) -> Option<char> {
    if vin.chars().count() != VIN_LENGTH {
        return None;
    }
    let mut sum = 0;
    for (c, weight) in vin.chars().zip(WEIGHTS) {
        sum += transliterate(c)? * weight;
    }
    match sum % 11 {
        10 => Some('X'),
        r => char::from_digit(r, 10),
    }
}

/// `true` when position 9 holds the correct check character.
#[must_use]
pub fn has_valid_check_digit(vin: &str) -> bool {
    check_digit(vin).is_some_and(|expected| vin.chars().nth(8) == Some(expected))
}

/// North American VINs (WMI region 1-5) must carry a valid check digit.
#[must_use]
pub fn is_north_american(vin: &str) -> bool {
    matches!(vin.chars().next(), Some('1'..='5'))
}

/// Decodes the model year from position 10. A letter in position 7 moves
/// the year into the 2010 cycle.
#[must_use]
pub fn model_year(vin: &str) -> Option<u16> {
    let code = vin.chars().nth(9)?;
    let index = YEAR_CODES.find(code)?;
    let base = 1980 + u16::try_from(index).ok()?;
    let second_cycle = vin.chars().nth(6).is_some_and(|c| c.is_ascii_alphabetic());
    Some(if second_cycle { base + 30 } else { base })
}

/// Local decode: model year plus manufacturer and make from the WMI table.
#[must_use]
pub fn decode_locally(vin: &str) -> DecodedVehicle {
    let wmi = WMI.iter().find(|(prefix, _, _)| vin.starts_with(prefix));
    DecodedVehicle {
        model_year: model_year(vin),
        manufacturer: wmi.map(|(_, manufacturer, _)| (*manufacturer).to_string()),
        make: wmi.map(|(_, _, make)| (*make).to_string()),
        ..DecodedVehicle::default()
    }
}

/// Uppercases and strips separators.
#[must_use]
pub fn normalize_vin(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[async_trait]
impl DocumentProcessor for VinProcessor {
    type Data = VinData;

    fn document_type(&self) -> DocumentType {
        DocumentType::Vin
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn prompt(&self, _context: &ProcessingContext) -> String {
        "You are reading a photo of a vehicle identification number (VIN) plate or sticker. \
         Reply with a single JSON object and nothing else, using these keys: \
         vin (exactly as printed, 17 characters), \
         location (dashboard, door_jamb, title, registration or other), confidence (0 to 1). \
         VINs never contain the letters I, O or Q."
            .to_string()
    }

    fn parse(&self, raw_text: &str, _context: &ProcessingContext) -> Parsed<VinData> {
        let reply = Reply::parse(raw_text);
        let mut notes = Vec::new();

        let mut data = if reply.has_json() {
            VinData {
                vin: reply.text_field(&["vin", "vin_number", "VIN"]).map(|v| normalize_vin(&v)),
                location: reply.text_field(&["location"]).map(|l| l.to_lowercase()),
                confidence: reply.confidence(),
                ..VinData::default()
            }
        } else {
            notes.push("model reply was not JSON; VIN scraped from text".to_string());
            let upper = reply.text().to_uppercase();
            VinData {
                vin: VIN_RE
                    .as_ref()
                    .and_then(|re| re.captures(&upper))
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string()),
                ..VinData::default()
            }
        };

        if let Some(vin) = data.vin.as_deref()
            && vin.len() == VIN_LENGTH
        {
            let decoded = decode_locally(vin);
            data.decoded = (!decoded.is_empty()).then_some(decoded);
        }
        let usable = data.vin.as_deref().is_some_and(|v| !v.is_empty());
        Parsed { data, usable, notes }
    }

    async fn validate(&self, data: &VinData, _context: &ProcessingContext) -> ValidationResult {
        let mut v = ValidationResult::ok();
        let Some(vin) = data.vin.as_deref() else {
            v.add_error("no VIN found");
            return v;
        };
        if vin.len() != VIN_LENGTH {
            v.add_error(format!("VIN has {} characters, expected {VIN_LENGTH}", vin.len()));
            return v;
        }
        let forbidden: Vec<char> = vin.chars().filter(|c| matches!(c, 'I' | 'O' | 'Q')).collect();
        if !forbidden.is_empty() {
            let list: String = forbidden.iter().collect();
            v.add_error(format!("VIN contains letters not used in VINs: {list}"));
            return v;
        }
        if !has_valid_check_digit(vin) {
            let expected = check_digit(vin).map_or_else(|| "?".to_string(), String::from);
            let message = format!("check digit mismatch (expected {expected} in position 9)");
            if is_north_american(vin) {
                v.add_error(message);
            } else {
                v.add_warning(message);
            }
        }
        v
    }

    fn supports_enrichment(&self) -> bool {
        self.decoder.is_some()
    }

    async fn enrich(
        &self,
        data: &VinData,
        _context: &ProcessingContext,
    ) -> Result<Option<VinData>, EnrichmentError> {
        let (Some(decoder), Some(vin)) = (self.decoder.as_ref(), data.vin.as_deref()) else {
            return Ok(None);
        };
        let remote = decoder.decode(vin).await?;
        let mut decoded = data.decoded.clone().unwrap_or_default();
        decoded.fill_from(remote);
        Ok(Some(VinData {
            decoded: Some(decoded),
            ..data.clone()
        }))
    }

    fn format(&self, data: &VinData) -> Option<String> {
        let vin = data.vin.as_deref()?;
        let description = data
            .decoded
            .as_ref()
            .map(|d| {
                [
                    d.model_year.map(|y| y.to_string()),
                    d.make.clone(),
                    d.model.clone(),
                ]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ")
            })
            .filter(|s| !s.is_empty());
        Some(match description {
            Some(description) => format!("VIN {vin} ({description})"),
            None => format!("VIN {vin}"),
        })
    }
}
