//! Vehicle events and their edit history.
//!
//! An [`Event`] records something that happened to a vehicle. Its payload
//! is untyped JSON and is interpreted by the [`crate::insight`] helpers.
//! Edits are applied through [`Event::apply_edit`], which appends to the
//! [`EditHistory`] in commit order.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ServiceError;

/// Kind of vehicle event. Unknown tags are preserved in [`EventType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// Fuel purchase.
    Fuel,
    /// Scheduled maintenance.
    Service,
    /// Odometer reading.
    Odometer,
    /// Dashboard photo snapshot.
    DashboardSnapshot,
    /// Unscheduled repair.
    Repair,
    /// Safety or emissions inspection.
    Inspection,
    /// Insurance policy or payment.
    Insurance,
    /// Accident report.
    Accident,
    /// Stored document (registration, title, VIN photo).
    Document,
    /// Any other tag, kept verbatim.
    Other(String),
}

impl EventType {
    /// Returns the wire tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Fuel => "fuel",
            Self::Service => "service",
            Self::Odometer => "odometer",
            Self::DashboardSnapshot => "dashboard_snapshot",
            Self::Repair => "repair",
            Self::Inspection => "inspection",
            Self::Insurance => "insurance",
            Self::Accident => "accident",
            Self::Document => "document",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for EventType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "fuel" => Self::Fuel,
            "service" | "maintenance" => Self::Service,
            "odometer" => Self::Odometer,
            "dashboard_snapshot" => Self::DashboardSnapshot,
            "repair" => Self::Repair,
            "inspection" => Self::Inspection,
            "insurance" => Self::Insurance,
            "accident" => Self::Accident,
            "document" => Self::Document,
            _ => Self::Other(tag),
        }
    }
}

impl From<&str> for EventType {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field changed by an edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FieldChange {
    /// Field name (payload key or numeric column).
    pub field: String,
    /// Value before the edit (`null` when the field was absent).
    #[schema(value_type = Object)]
    pub old_value: Value,
    /// Value after the edit.
    #[schema(value_type = Object)]
    pub new_value: Value,
}

/// A committed edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EditRecord {
    /// Commit timestamp.
    pub edited_at: DateTime<Utc>,
    /// Who made the edit, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_by: Option<String>,
    /// Free-text reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Fields changed by this edit.
    pub changes: Vec<FieldChange>,
}

/// Append-only edit history, stored oldest first.
///
/// Older rows persisted the history newest first. An array whose
/// timestamps strictly decrease is read back reversed; any other array
/// keeps its stored order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(from = "Vec<EditRecord>", into = "Vec<EditRecord>")]
pub struct EditHistory(Vec<EditRecord>);

impl EditHistory {
    /// Creates an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a committed edit.
    pub fn append(&mut self, record: EditRecord) {
        self.0.push(record);
    }

    /// Edits oldest first (storage order).
    pub fn chronological(&self) -> impl DoubleEndedIterator<Item = &EditRecord> {
        self.0.iter()
    }

    /// Edits newest first, for display.
    pub fn newest_first(&self) -> impl Iterator<Item = &EditRecord> {
        self.0.iter().rev()
    }

    /// Most recent edit.
    #[must_use]
    pub fn latest(&self) -> Option<&EditRecord> {
        self.0.last()
    }

    /// Number of edits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the event was never edited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<EditRecord>> for EditHistory {
    fn from(mut records: Vec<EditRecord>) -> Self {
        let newest_first = records.len() > 1
            && records
                .windows(2)
                .all(|pair| matches!(pair, [a, b] if a.edited_at > b.edited_at));
        if newest_first {
            records.reverse();
        }
        Self(records)
    }
}

impl From<EditHistory> for Vec<EditRecord> {
    fn from(history: EditHistory) -> Self {
        history.0
    }
}

/// A record of something that happened to a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Event {
    /// Event identifier.
    pub id: Uuid,
    /// Vehicle the event belongs to.
    pub vehicle_id: Uuid,
    /// Event kind.
    #[serde(rename = "type")]
    #[schema(value_type = String)]
    pub event_type: EventType,
    /// Calendar date of the event.
    pub date: NaiveDate,
    /// Type-specific free-form data.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: Value,
    /// Odometer miles, when recorded as a column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miles: Option<f64>,
    /// Total amount paid, when recorded as a column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    /// Gallons of fuel, when recorded as a column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gallons: Option<f64>,
    /// Committed edits, oldest first.
    #[serde(default)]
    pub edit_history: EditHistory,
}

/// Payload key under which legacy rows mirror extracted fields.
pub const EXTRACTED_DATA_KEY: &str = "extracted_data";

impl Event {
    /// Creates a new event with a fresh id and no numeric columns.
    #[must_use]
    pub fn new(vehicle_id: Uuid, event_type: EventType, date: NaiveDate, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            vehicle_id,
            event_type,
            date,
            payload,
            miles: None,
            total_amount: None,
            gallons: None,
            edit_history: EditHistory::new(),
        }
    }

    /// Applies an edit and appends it to the history.
    ///
    /// Keys `miles`, `total_amount` and `gallons` update the numeric
    /// column and the payload copy, `date` updates the event date, and
    /// every other key is set on the payload. Payload writes also reach the
    /// `extracted_data` mirror when the mirror already holds that key.
    /// Unchanged fields are not recorded; numbers compare by value, so `10`
    /// and `10.0` are the same. Returns the committed record, or `None`
    /// when nothing changed.
    ///
    /// The commit timestamp never precedes the previous edit, so the
    /// stored history stays chronological.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] if a numeric column gets a
    /// non-numeric value, `date` is not `YYYY-MM-DD`, or a payload key is
    /// edited on a non-object payload. No change is applied on error.
    pub fn apply_edit(
        &mut self,
        changes: &Map<String, Value>,
        edited_by: Option<String>,
        reason: Option<String>,
    ) -> Result<Option<&EditRecord>, ServiceError> {
        let mut staged = self.clone();
        let mut recorded = Vec::new();

        for (field, new_value) in changes {
            let old_value = staged.set_field(field, new_value)?;
            if !same_value(&old_value, new_value) {
                recorded.push(FieldChange {
                    field: field.clone(),
                    old_value,
                    new_value: new_value.clone(),
                });
            }
        }

        if recorded.is_empty() {
            return Ok(None);
        }

        let now = Utc::now();
        let edited_at = staged
            .edit_history
            .latest()
            .map_or(now, |last| last.edited_at.max(now));

        staged.edit_history.append(EditRecord {
            edited_at,
            edited_by,
            reason,
            changes: recorded,
        });
        *self = staged;

        tracing::debug!(event_id = %self.id, edits = self.edit_history.len(), "event edited");
        Ok(self.edit_history.latest())
    }

    /// Writes one field, returning its previous value.
    fn set_field(&mut self, field: &str, value: &Value) -> Result<Value, ServiceError> {
        match field {
            "miles" | "total_amount" | "gallons" => {
                let new = parse_column(field, value)?;
                let in_payload = self.payload_field(field);
                let column = match field {
                    "miles" => &mut self.miles,
                    "total_amount" => &mut self.total_amount,
                    _ => &mut self.gallons,
                };
                let old = std::mem::replace(column, new);
                if self.payload.is_null() {
                    self.payload = Value::Object(Map::new());
                }
                if let Some(payload) = self.payload.as_object_mut() {
                    write_payload(payload, field, value);
                }
                Ok(old.map(Value::from).or(in_payload).unwrap_or(Value::Null))
            }
            "date" => {
                let text = value.as_str().ok_or_else(|| {
                    ServiceError::InvalidRequest("date must be a YYYY-MM-DD string".to_string())
                })?;
                let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .map_err(|e| ServiceError::InvalidRequest(format!("invalid date: {e}")))?;
                let old = Value::String(self.date.format("%Y-%m-%d").to_string());
                self.date = date;
                Ok(old)
            }
            key => {
                if self.payload.is_null() {
                    self.payload = Value::Object(Map::new());
                }
                let Some(payload) = self.payload.as_object_mut() else {
                    return Err(ServiceError::InvalidRequest(
                        "payload is not an object".to_string(),
                    ));
                };
                Ok(write_payload(payload, key, value).unwrap_or(Value::Null))
            }
        }
    }

    /// Current payload value for `key`, top level first, then the mirror.
    fn payload_field(&self, key: &str) -> Option<Value> {
        self.payload
            .get(key)
            .or_else(|| self.payload.get(EXTRACTED_DATA_KEY).and_then(|m| m.get(key)))
            .filter(|v| !v.is_null())
            .cloned()
    }
}

/// Sets `key` on the payload and on its mirror when the mirror already
/// holds it. Returns the previous top-level value.
fn write_payload(payload: &mut Map<String, Value>, key: &str, value: &Value) -> Option<Value> {
    if let Some(mirror) = payload
        .get_mut(EXTRACTED_DATA_KEY)
        .and_then(Value::as_object_mut)
        && mirror.contains_key(key)
    {
        mirror.insert(key.to_string(), value.clone());
    }
    payload.insert(key.to_string(), value.clone())
}

fn parse_column(field: &str, value: &Value) -> Result<Option<f64>, ServiceError> {
    match value {
        Value::Null => Ok(None),
        other => other
            .as_f64()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| ServiceError::InvalidRequest(format!("{field} must be a number"))),
    }
}

#[allow(clippy::float_cmp)]
fn same_value(old: &Value, new: &Value) -> bool {
    match (old.as_f64(), new.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => old == new,
    }
}
