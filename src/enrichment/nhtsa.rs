//! NHTSA vPIC VIN decoder.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{DecodedVehicle, EnrichmentError, VinDecoder};

/// Client for the public vPIC `DecodeVinValues` endpoint.
#[derive(Debug, Clone)]
pub struct NhtsaVinDecoder {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct DecodeResponse {
    #[serde(rename = "Results", default)]
    results: Vec<DecodeRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DecodeRow {
    #[serde(default)]
    make: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    model_year: String,
    #[serde(default)]
    manufacturer: String,
    #[serde(default)]
    body_class: String,
}

impl NhtsaVinDecoder {
    /// Creates a decoder for the given base URL, e.g.
    /// `https://vpic.nhtsa.dot.gov/api` (no trailing slash needed).
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, vin: &str) -> String {
        format!("{}/vehicles/DecodeVinValues/{vin}?format=json", self.base_url)
    }
}

#[async_trait]
impl VinDecoder for NhtsaVinDecoder {
    async fn decode(&self, vin: &str) -> Result<DecodedVehicle, EnrichmentError> {
        let url = self.url(vin);
        debug!(url = %url, "decoding VIN via vPIC");
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EnrichmentError::Server {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }
        let body: DecodeResponse = resp.json().await?;
        decoded_from_response(vin, body)
    }
}

fn decoded_from_response(vin: &str, body: DecodeResponse) -> Result<DecodedVehicle, EnrichmentError> {
    let Some(row) = body.results.into_iter().next() else {
        return Err(EnrichmentError::Malformed("empty Results array".to_string()));
    };
    let decoded = DecodedVehicle {
        model_year: non_blank(row.model_year).and_then(|y| y.parse().ok()),
        manufacturer: non_blank(row.manufacturer),
        make: non_blank(row.make),
        model: non_blank(row.model),
        body_class: non_blank(row.body_class),
    };
    if decoded.is_empty() {
        return Err(EnrichmentError::NoMatch(vin.to_string()));
    }
    Ok(decoded)
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn parse(body: &str) -> DecodeResponse {
        let Ok(parsed) = serde_json::from_str(body) else {
            panic!("fixture must deserialize");
        };
        parsed
    }

    #[test]
    fn decodes_populated_row() {
        let body = parse(
            r#"{"Count":1,"Message":"Results returned successfully","Results":[
                {"Make":"HONDA","Model":"Accord","ModelYear":"2003",
                 "Manufacturer":"AMERICAN HONDA MOTOR CO., INC.","BodyClass":"Coupe","ErrorCode":"0"}]}"#,
        );
        let Ok(decoded) = decoded_from_response("1HGCM82633A004352", body) else {
            panic!("decode expected");
        };
        assert_eq!(decoded.make.as_deref(), Some("HONDA"));
        assert_eq!(decoded.model.as_deref(), Some("Accord"));
        assert_eq!(decoded.model_year, Some(2003));
        assert_eq!(decoded.body_class.as_deref(), Some("Coupe"));
    }

    #[test]
    fn blank_row_is_no_match() {
        let body = parse(r#"{"Results":[{"Make":"","Model":" ","ModelYear":""}]}"#);
        assert!(matches!(
            decoded_from_response("11111111111111111", body),
            Err(EnrichmentError::NoMatch(_))
        ));
    }

    #[test]
    fn empty_results_is_malformed() {
        let body = parse(r#"{"Results":[]}"#);
        assert!(matches!(
            decoded_from_response("11111111111111111", body),
            Err(EnrichmentError::Malformed(_))
        ));
    }

    #[test]
    fn url_trims_trailing_slash() {
        let decoder = NhtsaVinDecoder::new(reqwest::Client::new(), "https://vpic.example/api/");
        assert_eq!(
            decoder.url("1HGCM82633A004352"),
            "https://vpic.example/api/vehicles/DecodeVinValues/1HGCM82633A004352?format=json"
        );
    }
}
