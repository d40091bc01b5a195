//! # vehicle-vision
//!
//! Document vision pipeline for vehicle maintenance tracking.
//!
//! Photos of fuel receipts, service invoices, odometers, dashboards and
//! VIN plates are sent to a vision model; the reply is parsed, validated
//! and optionally enriched by a per-type processor, scored for
//! confidence, and recorded in process-wide metrics. Helpers interpret
//! stored event payloads for display (summary, vendor, confidence).
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── DocumentService (service/)
//!     ├── EventBus (domain/)
//!     ├── VisionMetrics (metrics/)
//!     │
//!     ├── ProcessorRegistry (domain/) → processors/
//!     ├── VisionModel (vision/)
//!     └── VinDecoder (enrichment/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod enrichment;
pub mod error;
pub mod insight;
pub mod metrics;
pub mod processors;
pub mod service;
pub mod vision;
pub mod ws;
