//! Concurrent processor storage keyed by document type.
//!
//! [`ProcessorRegistry`] maps each [`DocumentType`] to one processor
//! behind a [`tokio::sync::RwLock`]. Lookups clone the `Arc` out of the
//! map so the lock is never held across a vision call.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use super::DocumentType;
use super::processor_entry::{ProcessorEntry, ProcessorSummary};
use crate::enrichment::VinDecoder;
use crate::error::ServiceError;
use crate::processors::{
    DashboardSnapshotProcessor, ErasedProcessor, FuelReceiptProcessor, OdometerProcessor,
    ServiceInvoiceProcessor, VinProcessor,
};

/// Central store for document processors.
///
/// # Concurrency
///
/// - Lookups from concurrent requests share the read lock.
/// - Registration and removal take the write lock briefly.
#[derive(Debug)]
pub struct ProcessorRegistry {
    processors: RwLock<HashMap<DocumentType, ProcessorEntry>>,
}

impl ProcessorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            processors: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry holding the five built-in processors. The VIN
    /// processor uses `vin_decoder` for remote enrichment when given.
    #[must_use]
    pub fn with_default_processors(vin_decoder: Option<Arc<dyn VinDecoder>>) -> Self {
        let vin = match vin_decoder {
            Some(decoder) => VinProcessor::with_decoder(decoder),
            None => VinProcessor::new(),
        };
        let defaults: [Arc<dyn ErasedProcessor>; 5] = [
            Arc::new(FuelReceiptProcessor),
            Arc::new(ServiceInvoiceProcessor),
            Arc::new(OdometerProcessor),
            Arc::new(DashboardSnapshotProcessor),
            Arc::new(vin),
        ];
        let map = defaults
            .into_iter()
            .map(|processor| (processor.document_type(), ProcessorEntry::new(processor)))
            .collect();
        Self {
            processors: RwLock::new(map),
        }
    }

    /// Registers a processor for its document type.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ProcessorAlreadyRegistered`] if the type
    /// already has a processor; use [`Self::replace`] to override.
    pub async fn register(&self, processor: Arc<dyn ErasedProcessor>) -> Result<(), ServiceError> {
        let document_type = processor.document_type();
        let mut map = self.processors.write().await;
        if map.contains_key(&document_type) {
            return Err(ServiceError::ProcessorAlreadyRegistered(document_type));
        }
        info!(%document_type, version = processor.version(), "processor registered");
        map.insert(document_type, ProcessorEntry::new(processor));
        Ok(())
    }

    /// Registers a processor, returning the summary of the one it
    /// displaced.
    pub async fn replace(&self, processor: Arc<dyn ErasedProcessor>) -> Option<ProcessorSummary> {
        let document_type = processor.document_type();
        info!(%document_type, version = processor.version(), "processor replaced");
        let mut map = self.processors.write().await;
        map.insert(document_type, ProcessorEntry::new(processor))
            .map(|previous| ProcessorSummary::from(&previous))
    }

    /// Removes the processor for `document_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ProcessorNotFound`] if none is registered.
    pub async fn unregister(&self, document_type: DocumentType) -> Result<Arc<dyn ErasedProcessor>, ServiceError> {
        let mut map = self.processors.write().await;
        map.remove(&document_type)
            .map(|entry| entry.processor)
            .ok_or(ServiceError::ProcessorNotFound(document_type))
    }

    /// Returns the processor for `document_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ProcessorNotFound`] if none is registered.
    pub async fn get(&self, document_type: DocumentType) -> Result<Arc<dyn ErasedProcessor>, ServiceError> {
        let map = self.processors.read().await;
        map.get(&document_type)
            .map(|entry| Arc::clone(&entry.processor))
            .ok_or(ServiceError::ProcessorNotFound(document_type))
    }

    /// Returns `true` if `document_type` has a processor.
    pub async fn contains(&self, document_type: DocumentType) -> bool {
        self.processors.read().await.contains_key(&document_type)
    }

    /// Returns summaries of all processors, sorted by document type.
    pub async fn list(&self) -> Vec<ProcessorSummary> {
        let map = self.processors.read().await;
        let mut summaries: Vec<ProcessorSummary> = map.values().map(ProcessorSummary::from).collect();
        summaries.sort_by_key(|s| s.document_type);
        summaries
    }

    /// Returns the number of registered processors.
    pub async fn len(&self) -> usize {
        self.processors.read().await.len()
    }

    /// Returns `true` if no processors are registered.
    pub async fn is_empty(&self) -> bool {
        self.processors.read().await.is_empty()
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
