//! WebSocket message types: envelope, commands, and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    #[serde(default)]
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    #[serde(default)]
    pub payload: Value,
}

impl WsMessage {
    /// Builds a server message stamped now.
    #[must_use]
    pub fn new(id: impl Into<String>, msg_type: WsMessageType, payload: Value) -> Self {
        Self {
            id: id.into(),
            msg_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Builds an error message.
    #[must_use]
    pub fn error(id: impl Into<String>, code: u16, message: &str) -> Self {
        Self::new(
            id,
            WsMessageType::Error,
            serde_json::json!({ "code": code, "message": message }),
        )
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client broadcast event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands that a client can send over WebSocket, carried in the
/// envelope payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Subscribe to events for document types. `"*"` subscribes to all.
    Subscribe {
        /// Document type tags.
        document_types: Vec<String>,
    },
    /// Unsubscribe from document types. `"*"` clears the wildcard.
    Unsubscribe {
        /// Document type tags.
        document_types: Vec<String>,
    },
    /// Fetch the current metrics snapshot.
    GetMetrics,
}
