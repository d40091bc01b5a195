//! One-line event summaries.
//!
//! Each event type has a template of optional clauses; a clause whose
//! field is absent is dropped, never replaced with placeholder text.

use std::fmt::Write as _;

use serde_json::Value;

use super::lookup;
use super::vendor::resolve_vendor;
use crate::domain::{Event, EventType};

/// Numeric columns stored beside the payload. When present they take
/// precedence over payload copies.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EventColumns {
    /// Odometer miles column.
    pub miles: Option<f64>,
    /// Total amount column.
    pub total_amount: Option<f64>,
    /// Gallons column.
    pub gallons: Option<f64>,
}

impl From<&Event> for EventColumns {
    fn from(event: &Event) -> Self {
        Self {
            miles: event.miles,
            total_amount: event.total_amount,
            gallons: event.gallons,
        }
    }
}

/// Summarizes a full event.
#[must_use]
pub fn summarize_event(event: &Event) -> String {
    summarize(&event.event_type, &event.payload, EventColumns::from(event))
}

/// Summarizes a payload of the given type with no column overrides.
#[must_use]
pub fn generate_summary(event_type: &EventType, payload: &Value) -> String {
    summarize(event_type, payload, EventColumns::default())
}

/// Summarizes a payload with the given column overrides.
#[must_use]
pub fn summarize(event_type: &EventType, payload: &Value, columns: EventColumns) -> String {
    let vendor = resolve_vendor(payload);
    let amount = columns.total_amount.or_else(|| lookup::amount(payload));
    let miles = columns.miles.or_else(|| lookup::miles(payload));

    let mut line = String::new();
    match event_type {
        EventType::Fuel => {
            line.push_str("Fuel");
            if let Some(gallons) = columns.gallons.or_else(|| lookup::gallons(payload)) {
                let _ = write!(line, " {} gal", format_quantity(gallons));
            }
            if let Some(ppg) = lookup::price_per_gallon(payload) {
                let _ = write!(line, " @ ${}/gal", format_unit_price(ppg));
            }
            push_vendor_and_amount(&mut line, vendor.as_deref(), amount);
        }
        EventType::Service => {
            line.push_str(lookup::service_type(payload).unwrap_or("Service"));
            push_vendor_and_amount(&mut line, vendor.as_deref(), amount);
        }
        EventType::Repair => {
            line.push_str("Repair");
            if let Some(description) = lookup::description(payload) {
                let _ = write!(line, ": {description}");
            }
            push_vendor_and_amount(&mut line, vendor.as_deref(), amount);
        }
        EventType::Odometer => {
            line.push_str("Odometer reading");
            if let Some(miles) = miles {
                let _ = write!(line, ": {} mi", format_miles(miles));
            }
        }
        EventType::DashboardSnapshot => {
            line.push_str("Dashboard snapshot");
            if let Some(miles) = miles {
                let _ = write!(line, " - {} mi", format_miles(miles));
            }
            if let Some(level) = lookup::fuel_level(payload) {
                let _ = write!(line, " - fuel {}%", format_fuel_percent(level));
            }
            if let Some(count) = lookup::warning_light_count(payload).filter(|n| *n > 0) {
                let noun = if count == 1 { "light" } else { "lights" };
                let _ = write!(line, " - {count} warning {noun}");
            }
        }
        EventType::Inspection => {
            line.push_str("Inspection");
            match lookup::inspection_passed(payload) {
                Some(true) => line.push_str(" passed"),
                Some(false) => line.push_str(" failed"),
                None => {}
            }
            push_vendor_and_amount(&mut line, vendor.as_deref(), amount);
        }
        EventType::Insurance => {
            line.push_str("Insurance");
            if let Some(provider) = lookup::insurance_provider(payload).or(vendor.as_deref()) {
                let _ = write!(line, " - {provider}");
            }
            if let Some(policy) = lookup::policy_number(payload) {
                let _ = write!(line, " - policy {policy}");
            }
            if let Some(amount) = amount {
                let _ = write!(line, " - {}", format_amount(amount));
            }
        }
        EventType::Accident | EventType::Document | EventType::Other(_) => {
            let _ = write!(line, "{event_type} event");
            push_vendor_and_amount(&mut line, vendor.as_deref(), amount);
        }
    }
    line
}

fn push_vendor_and_amount(line: &mut String, vendor: Option<&str>, amount: Option<f64>) {
    if let Some(vendor) = vendor {
        let _ = write!(line, " at {vendor}");
    }
    if let Some(amount) = amount {
        let _ = write!(line, " - {}", format_amount(amount));
    }
}

/// Formats money as `$X.XX` (`-$X.XX` for refunds).
#[must_use]
pub fn format_amount(amount: f64) -> String {
    if amount < 0.0 {
        format!("-${:.2}", amount.abs())
    } else {
        format!("${amount:.2}")
    }
}

/// Up to three decimals, trailing zeros dropped: `10`, `10.5`, `12.345`.
#[must_use]
pub fn format_quantity(value: f64) -> String {
    let fixed = format!("{value:.3}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Unit prices keep cents, plus a third decimal when it is significant:
/// `3.50`, `3.459`.
#[must_use]
pub fn format_unit_price(value: f64) -> String {
    let three = format!("{value:.3}");
    if three.ends_with('0') {
        format!("{value:.2}")
    } else {
        three
    }
}

/// Whole miles with thousands separators: `45,210`.
#[must_use]
pub fn format_miles(miles: f64) -> String {
    #[allow(clippy::cast_possible_truncation)]
    let whole = miles.round() as i64;
    let digits = whole.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if whole < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Fuel level as a whole percentage. Values above 1 are already percents.
fn format_fuel_percent(level: f64) -> String {
    let percent = if level > 1.0 { level } else { level * 100.0 };
    format!("{:.0}", percent.clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fuel_without_vendor_or_price_omits_clauses() {
        let summary = generate_summary(&EventType::Fuel, &json!({"gallons": 10}));
        assert_eq!(summary, "Fuel 10 gal");
        assert!(!summary.contains(" at "));
        assert!(!summary.contains("/gal"));
    }

    #[test]
    fn fuel_full_line() {
        let payload = json!({
            "extracted_data": {"gallons": 10.5, "price_per_gallon": 3.459, "vendor_name": "Shell Station"},
            "total_amount": 36.32
        });
        assert_eq!(
            generate_summary(&EventType::Fuel, &payload),
            "Fuel 10.5 gal @ $3.459/gal at Shell - $36.32"
        );
    }

    #[test]
    fn fuel_with_nothing_is_just_fuel() {
        assert_eq!(generate_summary(&EventType::Fuel, &json!({})), "Fuel");
        assert_eq!(generate_summary(&EventType::Fuel, &json!(null)), "Fuel");
    }

    #[test]
    fn columns_take_precedence() {
        let columns = EventColumns {
            gallons: Some(12.0),
            total_amount: Some(40.0),
            miles: None,
        };
        let payload = json!({"gallons": 10, "total_amount": 30});
        assert_eq!(
            summarize(&EventType::Fuel, &payload, columns),
            "Fuel 12 gal - $40.00"
        );
    }

    #[test]
    fn service_uses_type_vendor_and_amount() {
        let payload = json!({
            "service_type": "Oil change",
            "business_name": "Jiffy Lube Service Center",
            "extracted_data": {"amount": 49.99}
        });
        assert_eq!(
            generate_summary(&EventType::Service, &payload),
            "Oil change at Jiffy Lube - $49.99"
        );
        assert_eq!(generate_summary(&EventType::Service, &json!({})), "Service");
    }

    #[test]
    fn repair_with_description() {
        let payload = json!({"description": "Replaced alternator", "total_amount": "412.10"});
        assert_eq!(
            generate_summary(&EventType::Repair, &payload),
            "Repair: Replaced alternator - $412.10"
        );
    }

    #[test]
    fn odometer_and_dashboard() {
        assert_eq!(
            generate_summary(&EventType::Odometer, &json!({"miles": 45210})),
            "Odometer reading: 45,210 mi"
        );
        let dash = json!({"data": {"odometer_miles": 1200.4, "fuel_level": 0.25, "warning_lights": ["tpms"]}});
        assert_eq!(
            generate_summary(&EventType::DashboardSnapshot, &dash),
            "Dashboard snapshot - 1,200 mi - fuel 25% - 1 warning light"
        );
    }

    #[test]
    fn inspection_and_insurance() {
        let inspection = json!({"passed": true, "vendor_name": "State Inspection Station"});
        assert_eq!(
            generate_summary(&EventType::Inspection, &inspection),
            "Inspection passed at State Inspection"
        );
        let insurance = json!({"provider": "Geico", "policy_number": "P-123", "amount": 610});
        assert_eq!(
            generate_summary(&EventType::Insurance, &insurance),
            "Insurance - Geico - policy P-123 - $610.00"
        );
    }

    #[test]
    fn unknown_types_use_generic_template() {
        let payload = json!({"vendor_name": "City Tow", "amount": 95});
        assert_eq!(
            generate_summary(&EventType::Accident, &payload),
            "accident event at City Tow - $95.00"
        );
        assert_eq!(
            generate_summary(&EventType::Other("car_wash".to_string()), &json!({})),
            "car_wash event"
        );
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_amount(5.0), "$5.00");
        assert_eq!(format_amount(-5.5), "-$5.50");
        assert_eq!(format_quantity(12.3456), "12.346");
        assert_eq!(format_unit_price(3.5), "3.50");
        assert_eq!(format_miles(999.0), "999");
        assert_eq!(format_miles(1_234_567.0), "1,234,567");
    }
}
