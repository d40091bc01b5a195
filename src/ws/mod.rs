//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` streams processing events to live
//! dashboards, filtered by document type.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
