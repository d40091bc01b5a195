//! Fan-out of processing outcomes to live WebSocket dashboards.
//!
//! The document service announces every finished upload and batch here;
//! each `/ws` connection holds its own receiver and filters by document
//! type. Nothing is buffered for connections that do not exist yet.

use tokio::sync::broadcast;

use super::{BatchResult, DocumentProcessingResult, ProcessingEvent};

/// Broadcast feed of [`ProcessingEvent`]s.
///
/// Slow dashboards that fall more than `capacity` events behind skip the
/// oldest ones and see `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ProcessingEvent>,
}

impl EventBus {
    /// Creates a feed keeping up to `capacity` undelivered events per
    /// receiver. A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Announces a finished upload. Returns how many dashboards were
    /// listening.
    pub fn publish_result(&self, result: &DocumentProcessingResult) -> usize {
        self.publish(ProcessingEvent::document_processed(result))
    }

    /// Announces a finished batch. Returns how many dashboards were
    /// listening.
    pub fn publish_batch(&self, batch: &BatchResult) -> usize {
        self.publish(ProcessingEvent::batch_completed(batch))
    }

    fn publish(&self, event: ProcessingEvent) -> usize {
        // No listeners is the normal state without open dashboards.
        self.sender.send(event).unwrap_or(0)
    }

    /// Opens a receiver for events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessingEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use tokio::sync::broadcast::error::RecvError;

    use super::*;
    use crate::domain::DocumentType;
    use crate::error::ErrorCode;

    fn timed_out(document_type: DocumentType) -> DocumentProcessingResult {
        DocumentProcessingResult::failed(
            document_type,
            ErrorCode::UpstreamTimeout,
            "vision request timed out",
            serde_json::Value::Null,
            String::new(),
            30_000,
        )
    }

    #[test]
    fn nobody_listening_is_not_an_error() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish_result(&timed_out(DocumentType::Odometer)), 0);
    }

    #[tokio::test]
    async fn dashboard_sees_failed_upload() {
        let bus = EventBus::new(8);
        let mut dashboard = bus.subscribe();

        let result = timed_out(DocumentType::Vin);
        assert_eq!(bus.publish_result(&result), 1);

        let Ok(event) = dashboard.recv().await else {
            panic!("dashboard should receive the upload");
        };
        assert!(event.concerns(DocumentType::Vin));
        assert!(!event.concerns(DocumentType::FuelReceipt));
        let ProcessingEvent::DocumentProcessed { result_id, success, .. } = event else {
            panic!("document event expected");
        };
        assert_eq!(result_id, result.id);
        assert!(!success);
    }

    #[tokio::test]
    async fn batch_reaches_every_dashboard() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let batch = BatchResult::from_results(
            vec![timed_out(DocumentType::Odometer), timed_out(DocumentType::FuelReceipt)],
            40,
        );
        assert_eq!(bus.publish_batch(&batch), 2);

        for dashboard in [&mut first, &mut second] {
            let Ok(ProcessingEvent::BatchCompleted { total, failed, .. }) = dashboard.recv().await else {
                panic!("batch event expected");
            };
            assert_eq!((total, failed), (2, 2));
        }
    }

    #[tokio::test]
    async fn zero_capacity_still_delivers_and_lags_slow_dashboards() {
        let bus = EventBus::new(0);
        let mut slow = bus.subscribe();

        bus.publish_result(&timed_out(DocumentType::Odometer));
        bus.publish_result(&timed_out(DocumentType::Vin));

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(1))));
        let Ok(event) = slow.recv().await else {
            panic!("latest event should survive");
        };
        assert!(event.concerns(DocumentType::Vin));
    }
}
