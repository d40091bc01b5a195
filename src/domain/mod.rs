//! Domain layer: document types, processing results, events, and the
//! processor registry.
//!
//! This module contains the server-side domain model: the document type
//! tag, the maintenance [`Event`] with its edit history, per-document
//! processing results, the processor registry, and the event bus that
//! broadcasts processing outcomes.

pub mod document_type;
pub mod event;
pub mod event_bus;
pub mod processing;
pub mod processing_event;
pub mod processor_entry;
pub mod processor_registry;

pub use document_type::DocumentType;
pub use event::{EditHistory, EditRecord, Event, EventType, FieldChange};
pub use event_bus::EventBus;
pub use processing::{
    BatchResult, BatchStatistics, DocumentProcessingResult, ProcessingContext, ProcessingFailure,
    ValidationResult,
};
pub use processing_event::ProcessingEvent;
pub use processor_entry::{ProcessorEntry, ProcessorSummary};
pub use processor_registry::ProcessorRegistry;
