//! Delivery pipeline: target identities -> connection IDs -> local sends.
//!
//! Resolution is global (it reads the shared registry) while dispatch is local:
//! a connection ID registered by another server process is a miss here.

pub mod dispatcher;
pub mod resolver;

use serde::Serialize;
use serde_json::Value;

pub use dispatcher::DispatchReport;

use crate::error::DeliveryError;
use crate::registry::SessionRegistry;
use crate::ws::{protocol, ConnectionTable};

/// Named event pushed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Notification,
    Message,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::Message => "message",
        }
    }
}

/// A payload and the identities it is addressed to.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub event: Event,
    pub payload: Value,
    pub targets: Vec<String>,
}

impl DeliveryRequest {
    /// Build a request from an ingress payload and its two recipient fields.
    pub fn new<P: Serialize>(
        event: Event,
        payload: &P,
        recipient: &str,
        recipients: &[String],
    ) -> Result<Self, DeliveryError> {
        Ok(Self {
            event,
            payload: serde_json::to_value(payload)?,
            targets: collect_targets(recipient, recipients),
        })
    }
}

/// Union of the singular recipient and every entry of the recipient list,
/// flattened. Blank entries name nobody and are skipped. Identities are kept
/// exactly as given; duplicates are kept too, resolution collapses them.
pub fn collect_targets(recipient: &str, recipients: &[String]) -> Vec<String> {
    let mut targets = Vec::with_capacity(recipients.len() + 1);

    if !recipient.trim().is_empty() {
        targets.push(recipient.to_string());
    }

    for (index, entry) in recipients.iter().enumerate() {
        if entry.trim().is_empty() {
            tracing::debug!(index, "Skipping blank recipient list entry");
            continue;
        }
        targets.push(entry.clone());
    }

    targets
}

/// Resolver + dispatcher over one registry and one connection table.
#[derive(Clone)]
pub struct DeliveryPipeline {
    registry: SessionRegistry,
    connections: ConnectionTable,
}

impl DeliveryPipeline {
    pub fn new(registry: SessionRegistry, connections: ConnectionTable) -> Self {
        Self {
            registry,
            connections,
        }
    }

    /// Encode once, resolve every target, push to each local connection.
    ///
    /// Only encoding can fail; lookups and sends degrade per identity and per
    /// connection and show up in the report instead.
    pub async fn deliver(&self, request: DeliveryRequest) -> Result<DispatchReport, DeliveryError> {
        let frame = protocol::encode_event(request.event.as_str(), &request.payload)?;
        let connection_ids = resolver::resolve(&self.registry, &request.targets).await;
        Ok(dispatcher::dispatch(
            &self.connections,
            request.event,
            &frame,
            &connection_ids,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MemoryStore, DEFAULT_KEY_PREFIX};
    use crate::ws::ConnectionHandle;
    use axum::extract::ws::Message;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[test]
    fn test_targets_union_both_fields_flattened() {
        let targets = collect_targets("321", &["283".to_string(), "321".to_string()]);
        assert_eq!(targets, vec!["321", "283", "321"]);
    }

    #[test]
    fn test_targets_absent_fields_give_empty_set() {
        assert!(collect_targets("", &[]).is_empty());
        assert_eq!(collect_targets("  ", &["9".to_string()]), vec!["9"]);
    }

    #[test]
    fn test_blank_list_entry_is_skipped() {
        let targets = collect_targets("", &["321".to_string(), "".to_string(), " ".to_string()]);
        assert_eq!(targets, vec!["321"]);
    }

    #[test]
    fn test_identities_are_not_rewritten() {
        assert_eq!(collect_targets(" 321 ", &[]), vec![" 321 "]);
    }

    #[tokio::test]
    async fn test_pipeline_pushes_to_registered_connection() {
        let registry = SessionRegistry::new(Arc::new(MemoryStore::new()), DEFAULT_KEY_PREFIX);
        let connections = ConnectionTable::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        connections.put("c1", ConnectionHandle::new("321", tx));
        registry.add("321", "c1").await;

        let pipeline = DeliveryPipeline::new(registry, connections);
        let request = DeliveryRequest::new(
            Event::Notification,
            &json!({"notificationId": "n1"}),
            "321",
            &[],
        )
        .unwrap();

        let report = pipeline.deliver(request).await.unwrap();
        assert_eq!(report.sent, 1);

        let Message::Text(text) = rx.try_recv().unwrap() else {
            panic!("expected a text frame");
        };
        let frame: Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(frame["event"], "notification");
        assert_eq!(frame["data"]["notificationId"], "n1");
        assert!(rx.try_recv().is_err());
    }
}
