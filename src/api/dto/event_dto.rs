//! Event DTOs for insight and edit operations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::domain::{EditRecord, Event};

/// Request body for `POST /events/edit`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EditEventRequest {
    /// Event to edit.
    pub event: Event,
    /// Field name to new value.
    #[schema(value_type = Object)]
    pub changes: Map<String, Value>,
    /// Who made the edit.
    #[serde(default)]
    pub edited_by: Option<String>,
    /// Why the edit was made.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Response body for `POST /events/edit`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EditEventResponse {
    /// The event after the edit.
    pub event: Event,
    /// The committed edit, or `null` when nothing changed.
    pub edit: Option<EditRecord>,
}
