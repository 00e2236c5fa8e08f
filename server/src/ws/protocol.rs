//! Named-event framing on top of WebSocket text frames.
//!
//! Every frame in either direction is a JSON object
//! `{"event": "<name>", "data": <payload>}`.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event a client may emit; it is observed and logged, nothing more.
pub const CLIENT_NOTIFICATION_EVENT: &str = "notification";

#[derive(Debug, Serialize, Deserialize)]
pub struct EventFrame<T> {
    pub event: String,
    pub data: T,
}

/// Encode `data` as a named event frame, ready to clone to many connections.
pub fn encode_event<T: Serialize>(event: &str, data: &T) -> Result<Message, serde_json::Error> {
    let frame = EventFrame {
        event: event.to_string(),
        data,
    };
    let text = serde_json::to_string(&frame)?;
    Ok(Message::Text(text.into()))
}

/// Handle an incoming text frame from a client.
pub fn handle_text_message(text: &str, connection_id: &str, identity: &str) {
    let frame = match serde_json::from_str::<EventFrame<Value>>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(
                connection_id = %connection_id,
                error = %e,
                "Ignoring malformed client frame"
            );
            return;
        }
    };

    match frame.event.as_str() {
        CLIENT_NOTIFICATION_EVENT => {
            tracing::info!(
                connection_id = %connection_id,
                identity = %identity,
                data = %frame.data,
                "Received notification from client"
            );
        }
        other => {
            tracing::debug!(
                connection_id = %connection_id,
                event = %other,
                "Unhandled client event"
            );
        }
    }
}
