//! Per-connection subscription manager.
//!
//! Tracks which document types a WebSocket client is subscribed to and
//! provides server-side event filtering.

use std::collections::BTreeSet;

use crate::domain::{DocumentType, ProcessingEvent};

/// Manages the set of document type subscriptions for one connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed types. Ignored while `subscribe_all` is set.
    document_types: BTreeSet<DocumentType>,
    /// Whether the client subscribes to every type (wildcard `"*"`).
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds document types to the subscription set.
    pub fn subscribe(&mut self, types: &[DocumentType], wildcard: bool) {
        if wildcard {
            self.subscribe_all = true;
        }
        self.document_types.extend(types.iter().copied());
    }

    /// Removes document types. `wildcard` clears the wildcard flag.
    pub fn unsubscribe(&mut self, types: &[DocumentType], wildcard: bool) {
        if wildcard {
            self.subscribe_all = false;
        }
        for t in types {
            self.document_types.remove(t);
        }
    }

    /// Returns `true` if the event passes the subscription filter.
    #[must_use]
    pub fn matches(&self, event: &ProcessingEvent) -> bool {
        self.subscribe_all || self.document_types.iter().any(|t| event.concerns(*t))
    }

    /// Explicitly subscribed types, sorted.
    #[must_use]
    pub fn document_types(&self) -> Vec<DocumentType> {
        self.document_types.iter().copied().collect()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::DocumentProcessingResult;
    use crate::error::ErrorCode;

    fn event(document_type: DocumentType) -> ProcessingEvent {
        ProcessingEvent::document_processed(&DocumentProcessingResult::failed(
            document_type,
            ErrorCode::ParseFailed,
            "unreadable",
            serde_json::Value::Null,
            String::new(),
            5,
        ))
    }

    #[test]
    fn empty_matches_nothing() {
        let mgr = SubscriptionManager::new();
        assert!(!mgr.matches(&event(DocumentType::Vin)));
    }

    #[test]
    fn subscribe_specific_type() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[DocumentType::FuelReceipt], false);
        assert!(mgr.matches(&event(DocumentType::FuelReceipt)));
        assert!(!mgr.matches(&event(DocumentType::Odometer)));
    }

    #[test]
    fn wildcard_matches_everything_until_cleared() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[], true);
        assert!(mgr.matches(&event(DocumentType::Odometer)));
        assert!(mgr.matches(&event(DocumentType::DashboardSnapshot)));
        mgr.unsubscribe(&[], true);
        assert!(!mgr.matches(&event(DocumentType::Odometer)));
    }

    #[test]
    fn unsubscribe_removes_type() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[DocumentType::Vin, DocumentType::Odometer], false);
        mgr.unsubscribe(&[DocumentType::Vin], false);
        assert!(!mgr.matches(&event(DocumentType::Vin)));
        assert_eq!(mgr.document_types(), vec![DocumentType::Odometer]);
    }
}
