//! External data sources that enrich extracted documents.
//!
//! Enrichment is optional: a source that fails or times out degrades the
//! result to its unenriched form, it never fails the upload.

pub mod nhtsa;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub use nhtsa::NhtsaVinDecoder;

/// Failure of an enrichment source.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// The source could not be reached.
    #[error("enrichment source unavailable: {0}")]
    Unavailable(String),

    /// The source answered with a non-success status.
    #[error("enrichment source returned {status}: {body}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The source answered but had nothing for the input.
    #[error("no match for {0}")]
    NoMatch(String),

    /// The response could not be decoded.
    #[error("malformed enrichment response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for EnrichmentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

/// Vehicle attributes decoded from a VIN.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DecodedVehicle {
    /// Model year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_year: Option<u16>,
    /// Manufacturer (legal name or WMI region/maker).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// Marketing make.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    /// Model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Body class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_class: Option<String>,
}

impl DecodedVehicle {
    /// Fills fields missing from `self` with those of `other`.
    pub fn fill_from(&mut self, other: Self) {
        self.model_year = self.model_year.or(other.model_year);
        if self.manufacturer.is_none() {
            self.manufacturer = other.manufacturer;
        }
        if self.make.is_none() {
            self.make = other.make;
        }
        if self.model.is_none() {
            self.model = other.model;
        }
        if self.body_class.is_none() {
            self.body_class = other.body_class;
        }
    }

    /// `true` when nothing was decoded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.model_year.is_none()
            && self.manufacturer.is_none()
            && self.make.is_none()
            && self.model.is_none()
            && self.body_class.is_none()
    }
}

/// Remote VIN decoding service.
#[async_trait]
pub trait VinDecoder: Send + Sync + std::fmt::Debug {
    /// Decodes a validated 17-character VIN.
    async fn decode(&self, vin: &str) -> Result<DecodedVehicle, EnrichmentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_from_keeps_existing_fields() {
        let mut local = DecodedVehicle {
            model_year: Some(2003),
            manufacturer: Some("Honda (USA)".to_string()),
            ..DecodedVehicle::default()
        };
        local.fill_from(DecodedVehicle {
            model_year: Some(1973),
            manufacturer: Some("AMERICAN HONDA MOTOR CO., INC.".to_string()),
            make: Some("HONDA".to_string()),
            model: Some("Accord".to_string()),
            body_class: None,
        });
        assert_eq!(local.model_year, Some(2003));
        assert_eq!(local.manufacturer.as_deref(), Some("Honda (USA)"));
        assert_eq!(local.make.as_deref(), Some("HONDA"));
        assert!(local.body_class.is_none());
        assert!(!local.is_empty());
        assert!(DecodedVehicle::default().is_empty());
    }
}
