use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::Response,
};
use uuid::Uuid;

use crate::auth::ConnectionAttempt;
use crate::error::AdmissionError;
use crate::state::AppState;
use crate::ws::actor;
use crate::ws::lifecycle::Lifecycle;

/// WebSocket close codes for refused attempts:
/// 4001 = missing credentials
/// 4002 = session rejected
/// 4003 = authentication service unavailable
pub const CLOSE_MISSING_CREDENTIALS: u16 = 4001;
pub const CLOSE_SESSION_REJECTED: u16 = 4002;
pub const CLOSE_AUTH_UNAVAILABLE: u16 = 4003;

fn close_code_for(err: &AdmissionError) -> (u16, &'static str) {
    match err {
        AdmissionError::MissingCredential(_) => (CLOSE_MISSING_CREDENTIALS, "Missing credentials"),
        AdmissionError::Rejected(_) | AdmissionError::EmptySession => {
            (CLOSE_SESSION_REJECTED, "Session rejected")
        }
        AdmissionError::Unreachable(_) | AdmissionError::Timeout(_) => {
            (CLOSE_AUTH_UNAVAILABLE, "Authentication unavailable")
        }
    }
}

/// GET /ws
/// WebSocket upgrade endpoint. Authenticates via the `authorization` and
/// `profileid` handshake headers before anything is registered.
/// On auth failure, upgrades then immediately closes with a close code.
/// On success, spawns an actor for the connection.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let mut lifecycle = Lifecycle::new(Uuid::new_v4().to_string());
    let attempt = ConnectionAttempt::from_headers(&headers);

    match state.admission.admit(&attempt).await {
        Ok(admitted) => {
            lifecycle.admitted();
            tracing::info!(
                connection_id = %lifecycle.connection_id(),
                identity = %admitted.identity,
                "WebSocket connection authenticated"
            );
            ws.on_upgrade(move |socket| {
                actor::run_connection(socket, state, lifecycle, admitted.identity)
            })
        }
        Err(err) => {
            let (close_code, reason) = close_code_for(&err);
            tracing::warn!(
                connection_id = %lifecycle.connection_id(),
                close_code = close_code,
                error = %err,
                "WebSocket admission refused"
            );
            lifecycle.closed();

            // Upgrade the connection, then immediately close with the error code
            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code: close_code,
                    reason: reason.into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}
