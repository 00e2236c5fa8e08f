pub mod actor;
pub mod handler;
pub mod lifecycle;
pub mod protocol;

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::error::SendError;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Writable handle to one live WebSocket connection owned by this process.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    identity: Arc<str>,
    sender: ConnectionSender,
    connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn new(identity: &str, sender: ConnectionSender) -> Self {
        Self {
            identity: Arc::from(identity),
            sender,
            connected_at: Utc::now(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Queue an already-encoded frame for the connection's writer task.
    pub fn send(&self, frame: Message) -> Result<(), SendError> {
        self.sender.send(frame).map_err(|_| SendError::Closed)
    }

    /// Ask the client to close. The actor deregisters once the socket ends.
    pub fn disconnect(&self, code: u16, reason: &str) {
        let close_frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        let _ = self.sender.send(Message::Close(Some(close_frame)));
    }
}

/// Connection table: connection ID -> handle, for connections held by this process.
///
/// Shared by every connection actor and every delivery request; DashMap keeps
/// put/get/delete linearizable per key without a global lock.
#[derive(Clone, Default)]
pub struct ConnectionTable {
    inner: Arc<DashMap<String, ConnectionHandle>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, connection_id: &str, handle: ConnectionHandle) {
        self.inner.insert(connection_id.to_string(), handle);
    }

    pub fn get(&self, connection_id: &str) -> Option<ConnectionHandle> {
        self.inner.get(connection_id).map(|entry| entry.value().clone())
    }

    pub fn delete(&self, connection_id: &str) -> Option<ConnectionHandle> {
        self.inner.remove(connection_id).map(|(_, handle)| handle)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Remove and return every entry (bulk eviction).
    pub fn drain(&self) -> Vec<(String, ConnectionHandle)> {
        let ids: Vec<String> = self.inner.iter().map(|entry| entry.key().clone()).collect();
        ids.into_iter()
            .filter_map(|id| self.inner.remove(&id))
            .collect()
    }
}
