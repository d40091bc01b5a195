//! Data Transfer Objects for REST request/response serialization.
//!
//! Domain types that already serialize cleanly (results, events,
//! snapshots) are returned directly; DTOs cover request shapes and the
//! few responses that combine several domain values.

pub mod document_dto;
pub mod event_dto;

pub use document_dto::*;
pub use event_dto::*;
