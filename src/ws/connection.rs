//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding filtered events.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::domain::{DocumentType, ProcessingEvent};
use crate::metrics::VisionMetrics;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
pub async fn run_connection(
    socket: WebSocket,
    mut event_rx: broadcast::Receiver<ProcessingEvent>,
    metrics: Arc<VisionMetrics>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(&text, &mut subs, &metrics);
                        if let Some(resp_json) = response
                            && ws_tx.send(Message::text(resp_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(processing_event) => {
                        if subs.matches(&processing_event) {
                            let msg = WsMessage::new(
                                uuid::Uuid::new_v4().to_string(),
                                WsMessageType::Event,
                                serde_json::to_value(&processing_event).unwrap_or_default(),
                            );
                            let json = serde_json::to_string(&msg).unwrap_or_default();
                            if ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

/// Splits tags into known document types and the wildcard flag. Unknown
/// tags are returned separately.
fn parse_types(tags: &[String]) -> (Vec<DocumentType>, bool, Vec<String>) {
    let mut types = Vec::new();
    let mut wildcard = false;
    let mut unknown = Vec::new();
    for tag in tags {
        if tag.trim() == "*" {
            wildcard = true;
        } else if let Ok(t) = tag.parse::<DocumentType>() {
            types.push(t);
        } else {
            unknown.push(tag.clone());
        }
    }
    (types, wildcard, unknown)
}

/// Handles a text message from the client, returning an optional JSON response.
fn handle_text_message(
    text: &str,
    subs: &mut SubscriptionManager,
    metrics: &VisionMetrics,
) -> Option<String> {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return serde_json::to_string(&WsMessage::error("", 400, "malformed JSON")).ok();
    };
    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
        return serde_json::to_string(&WsMessage::error(msg.id, 404, "unknown command")).ok();
    };

    let payload = match command {
        WsCommand::Subscribe { document_types } => {
            let (types, wildcard, unknown) = parse_types(&document_types);
            subs.subscribe(&types, wildcard);
            json!({
                "subscribed": subs.document_types(),
                "wildcard": subs.is_subscribed_all(),
                "ignored": unknown,
            })
        }
        WsCommand::Unsubscribe { document_types } => {
            let (types, wildcard, unknown) = parse_types(&document_types);
            subs.unsubscribe(&types, wildcard);
            json!({
                "subscribed": subs.document_types(),
                "wildcard": subs.is_subscribed_all(),
                "ignored": unknown,
            })
        }
        WsCommand::GetMetrics => serde_json::to_value(metrics.snapshot()).unwrap_or_default(),
    };
    serde_json::to_string(&WsMessage::new(msg.id, WsMessageType::Response, payload)).ok()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn respond(text: &str, subs: &mut SubscriptionManager) -> Value {
        let metrics = VisionMetrics::new();
        let Some(reply) = handle_text_message(text, subs, &metrics) else {
            panic!("reply expected");
        };
        let Ok(value) = serde_json::from_str(&reply) else {
            panic!("reply must be JSON");
        };
        value
    }

    #[test]
    fn subscribe_by_type_and_wildcard() {
        let mut subs = SubscriptionManager::new();
        let reply = respond(
            r#"{"id":"1","type":"command","payload":{"command":"subscribe","document_types":["odometer","parking_ticket"]}}"#,
            &mut subs,
        );
        assert_eq!(reply["type"], "response");
        assert_eq!(reply["id"], "1");
        assert_eq!(reply["payload"]["subscribed"][0], "odometer");
        assert_eq!(reply["payload"]["ignored"][0], "parking_ticket");
        assert!(!subs.is_subscribed_all());

        respond(
            r#"{"id":"2","type":"command","payload":{"command":"subscribe","document_types":["*"]}}"#,
            &mut subs,
        );
        assert!(subs.is_subscribed_all());
    }

    #[test]
    fn get_metrics_returns_snapshot() {
        let mut subs = SubscriptionManager::new();
        let reply = respond(r#"{"id":"m","type":"command","payload":{"command":"get_metrics"}}"#, &mut subs);
        assert_eq!(reply["payload"]["total_requests"], 0);
    }

    #[test]
    fn malformed_and_unknown_messages() {
        let mut subs = SubscriptionManager::new();
        let reply = respond("not json", &mut subs);
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["payload"]["code"], 400);

        let reply = respond(r#"{"id":"x","type":"command","payload":{"command":"swap"}}"#, &mut subs);
        assert_eq!(reply["payload"]["code"], 404);
        assert_eq!(reply["id"], "x");
    }
}
