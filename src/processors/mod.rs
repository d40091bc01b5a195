//! Document processors: prompt, parse, validate, enrich, format.
//!
//! Each document type implements the typed [`DocumentProcessor`] trait
//! over its own data struct. The registry stores processors behind the
//! object-safe [`ErasedProcessor`], which every typed processor gets for
//! free and which runs the post-model pipeline:
//!
//! parse -> validate -> enrich (bounded, degrading) -> format

pub mod dashboard;
pub mod fuel_receipt;
pub mod odometer;
pub mod reply;
pub mod service_invoice;
pub mod vin;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

pub use dashboard::DashboardSnapshotProcessor;
pub use fuel_receipt::FuelReceiptProcessor;
pub use odometer::OdometerProcessor;
pub use service_invoice::ServiceInvoiceProcessor;
pub use vin::VinProcessor;

use crate::domain::{DocumentType, ProcessingContext, ValidationResult};
use crate::enrichment::EnrichmentError;

/// Best-effort parse output.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    /// Structured data; fields the reply lacked stay empty.
    pub data: T,
    /// `false` when no key field could be recovered.
    pub usable: bool,
    /// Observations about the reply (non-JSON, scraped, clamped values).
    pub notes: Vec<String>,
}

impl<T> Parsed<T> {
    /// Usable data with no notes.
    pub const fn usable(data: T) -> Self {
        Self {
            data,
            usable: true,
            notes: Vec::new(),
        }
    }

    /// Adds a note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// Typed processing contract for one document type.
#[async_trait]
pub trait DocumentProcessor: Send + Sync + std::fmt::Debug + 'static {
    /// Structured data this processor extracts.
    type Data: Serialize + Send + Sync;

    /// Document type handled.
    fn document_type(&self) -> DocumentType;

    /// Processor version, reported by the registry.
    fn version(&self) -> &'static str;

    /// Vision prompt. Deterministic for the same context.
    fn prompt(&self, context: &ProcessingContext) -> String;

    /// Turns raw model text into data. Never fails.
    fn parse(&self, raw_text: &str, context: &ProcessingContext) -> Parsed<Self::Data>;

    /// Checks parsed data.
    async fn validate(&self, data: &Self::Data, context: &ProcessingContext) -> ValidationResult;

    /// Whether [`DocumentProcessor::enrich`] does anything.
    fn supports_enrichment(&self) -> bool {
        false
    }

    /// Returns enriched data, or `None` when there was nothing to add.
    async fn enrich(
        &self,
        _data: &Self::Data,
        _context: &ProcessingContext,
    ) -> Result<Option<Self::Data>, EnrichmentError> {
        Ok(None)
    }

    /// Display rendering.
    fn format(&self, _data: &Self::Data) -> Option<String> {
        None
    }
}

/// Pipeline output of an [`ErasedProcessor`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedDocument {
    /// Structured (possibly enriched) data as JSON.
    pub data: Value,
    /// Whether parsing recovered a key field.
    pub usable: bool,
    /// Validation outcome, including parse notes and enrichment warnings.
    pub validation: ValidationResult,
    /// Whether enrichment was applied.
    pub enriched: bool,
    /// Display rendering, if any.
    pub formatted: Option<String>,
}

/// Object-safe processor used by the registry.
#[async_trait]
pub trait ErasedProcessor: Send + Sync + std::fmt::Debug {
    /// Document type handled.
    fn document_type(&self) -> DocumentType;

    /// Processor version.
    fn version(&self) -> &'static str;

    /// Whether the processor enriches.
    fn supports_enrichment(&self) -> bool;

    /// Vision prompt.
    fn prompt(&self, context: &ProcessingContext) -> String;

    /// Runs the post-model pipeline over a raw reply. Enrichment only runs
    /// on usable, valid data and is bounded by `enrichment_timeout`.
    async fn process_text(
        &self,
        raw_text: &str,
        context: &ProcessingContext,
        enrichment_timeout: Duration,
    ) -> ProcessedDocument;
}

#[async_trait]
impl<P: DocumentProcessor> ErasedProcessor for P {
    fn document_type(&self) -> DocumentType {
        DocumentProcessor::document_type(self)
    }

    fn version(&self) -> &'static str {
        DocumentProcessor::version(self)
    }

    fn supports_enrichment(&self) -> bool {
        DocumentProcessor::supports_enrichment(self)
    }

    fn prompt(&self, context: &ProcessingContext) -> String {
        DocumentProcessor::prompt(self, context)
    }

    async fn process_text(
        &self,
        raw_text: &str,
        context: &ProcessingContext,
        enrichment_timeout: Duration,
    ) -> ProcessedDocument {
        let document_type = DocumentProcessor::document_type(self);
        let Parsed {
            mut data,
            usable,
            notes,
        } = DocumentProcessor::parse(self, raw_text, context);

        let mut validation = self.validate(&data, context).await;
        for note in notes {
            validation.add_warning(note);
        }

        let mut enriched = false;
        if usable && validation.valid && DocumentProcessor::supports_enrichment(self) {
            match tokio::time::timeout(enrichment_timeout, self.enrich(&data, context)).await {
                Ok(Ok(Some(richer))) => {
                    data = richer;
                    enriched = true;
                }
                Ok(Ok(None)) => {}
                Ok(Err(err)) => {
                    warn!(%document_type, error = %err, "enrichment failed, keeping unenriched data");
                    validation.add_warning(format!("enrichment unavailable: {err}"));
                }
                Err(_) => {
                    warn!(
                        %document_type,
                        timeout_ms = enrichment_timeout.as_millis(),
                        "enrichment timed out, keeping unenriched data"
                    );
                    validation.add_warning("enrichment timed out");
                }
            }
        }

        let formatted = if usable {
            DocumentProcessor::format(self, &data)
        } else {
            None
        };
        let data = serde_json::to_value(&data).unwrap_or_else(|err| {
            error!(%document_type, error = %err, "processor data failed to serialize");
            Value::Null
        });

        ProcessedDocument {
            data,
            usable,
            validation,
            enriched,
            formatted,
        }
    }
}

/// Rounds to `places` decimals.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}
