//! Document type tag.
//!
//! [`DocumentType`] is the key of the processor registry, the discriminator
//! on processing results and metrics, and the WebSocket subscription
//! target.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ServiceError;

/// Category of scanned document handled by one processor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Fuel station receipt (gallons, price per gallon, total).
    FuelReceipt,
    /// Shop or dealer service invoice with line items.
    ServiceInvoice,
    /// Close-up photo of the odometer display.
    Odometer,
    /// Whole-cluster dashboard photo (odometer, fuel gauge, warning lights).
    DashboardSnapshot,
    /// VIN plate, door-jamb sticker, or registration card.
    Vin,
}

impl DocumentType {
    /// Every supported document type, in registry order.
    pub const ALL: [Self; 5] = [
        Self::FuelReceipt,
        Self::ServiceInvoice,
        Self::Odometer,
        Self::DashboardSnapshot,
        Self::Vin,
    ];

    /// Returns the wire tag (e.g. `"fuel_receipt"`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FuelReceipt => "fuel_receipt",
            Self::ServiceInvoice => "service_invoice",
            Self::Odometer => "odometer",
            Self::DashboardSnapshot => "dashboard_snapshot",
            Self::Vin => "vin",
        }
    }

    /// Extracted fields a reviewer can mark right or wrong.
    #[must_use]
    pub const fn reviewable_fields(&self) -> &'static [&'static str] {
        match self {
            Self::FuelReceipt => &[
                "vendor_name",
                "station_address",
                "date",
                "gallons",
                "price_per_gallon",
                "total_amount",
                "fuel_grade",
            ],
            Self::ServiceInvoice => &[
                "business_name",
                "date",
                "miles",
                "total_amount",
                "service_type",
                "line_items",
            ],
            Self::Odometer => &["reading", "unit", "miles", "trip_reading", "display_type"],
            Self::DashboardSnapshot => &[
                "odometer_miles",
                "fuel_level",
                "range_miles",
                "warning_lights",
                "outside_temp_f",
            ],
            Self::Vin => &[
                "vin",
                "location",
                "decoded.model_year",
                "decoded.manufacturer",
                "decoded.make",
                "decoded.model",
                "decoded.body_class",
            ],
        }
    }

    /// Short human description used by the catalog endpoint.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::FuelReceipt => "Fuel purchase receipt",
            Self::ServiceInvoice => "Maintenance or repair invoice",
            Self::Odometer => "Odometer close-up photo",
            Self::DashboardSnapshot => "Instrument cluster photo with gauges and warning lights",
            Self::Vin => "VIN plate, sticker, or registration document",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = ServiceError;

    /// Parses a wire tag. A few legacy aliases (`receipt`, `fuel`,
    /// `invoice`, `dashboard`, `vin_plate`) are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fuel_receipt" | "receipt" | "fuel" => Ok(Self::FuelReceipt),
            "service_invoice" | "invoice" | "service" => Ok(Self::ServiceInvoice),
            "odometer" => Ok(Self::Odometer),
            "dashboard_snapshot" | "dashboard" => Ok(Self::DashboardSnapshot),
            "vin" | "vin_plate" => Ok(Self::Vin),
            _ => Err(ServiceError::UnsupportedDocumentType(s.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde_tag() {
        for doc_type in DocumentType::ALL {
            let json = serde_json::to_string(&doc_type).unwrap_or_default();
            assert_eq!(json, format!("\"{doc_type}\""));
        }
    }

    #[test]
    fn parses_tags_and_aliases() {
        assert_eq!(
            "dashboard".parse::<DocumentType>().ok(),
            Some(DocumentType::DashboardSnapshot)
        );
        assert_eq!(
            " Fuel_Receipt ".parse::<DocumentType>().ok(),
            Some(DocumentType::FuelReceipt)
        );
        assert!("parking_ticket".parse::<DocumentType>().is_err());
    }

    #[test]
    fn hash_works_in_hashmap() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(DocumentType::Vin, "vin");
        assert_eq!(map.get(&DocumentType::Vin), Some(&"vin"));
        assert_eq!(map.get(&DocumentType::Odometer), None);
    }
}
