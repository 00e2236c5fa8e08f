use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::state::AppState;
use crate::ws::lifecycle::Lifecycle;
use crate::ws::{protocol, ConnectionHandle};

/// Ping interval: server sends WebSocket ping every 30 seconds.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for an admitted WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader task: processes incoming frames until the client goes away
///
/// The mpsc sender is the connection's transport handle: the dispatcher
/// reaches this client by looking it up in the connection table.
pub async fn run_connection(
    socket: WebSocket,
    state: AppState,
    mut lifecycle: Lifecycle,
    identity: String,
) {
    let connection_id = lifecycle.connection_id().to_string();
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let handle = ConnectionHandle::new(&identity, tx.clone());
    register_connection(&state, &identity, &connection_id, handle).await;
    lifecycle.registered();

    tracing::info!(
        connection_id = %connection_id,
        identity = %identity,
        "WebSocket actor started"
    );

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_handle = tokio::spawn(ping_task(tx.clone(), pong_rx, PING_INTERVAL, PONG_TIMEOUT));

    // Reader loop: process incoming WebSocket messages
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_message(text.as_str(), &connection_id, &identity);
                }
                Message::Binary(data) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        bytes = data.len(),
                        "Ignoring binary frame"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        connection_id = %connection_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(connection_id = %connection_id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: abort writer and ping tasks
    writer_handle.abort();
    ping_handle.abort();

    unregister_connection(&state, &identity, &connection_id).await;
    lifecycle.closed();

    tracing::info!(
        connection_id = %connection_id,
        identity = %identity,
        "WebSocket actor stopped"
    );
}

/// Ping task: sends a ping every `every` and closes the connection when no pong
/// follows within `pong_timeout`.
async fn ping_task(
    ping_tx: mpsc::UnboundedSender<Message>,
    mut pong_rx: mpsc::UnboundedReceiver<()>,
    every: Duration,
    pong_timeout: Duration,
) {
    let mut ping_timer = interval(every);
    // Skip the first immediate tick
    ping_timer.tick().await;

    loop {
        ping_timer.tick().await;

        // Unsolicited pongs received since the last check prove nothing about this ping
        while pong_rx.try_recv().is_ok() {}

        if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
            // Writer task has died, connection is gone
            break;
        }

        match timeout(pong_timeout, pong_rx.recv()).await {
            Ok(Some(())) => {}
            _ => {
                tracing::warn!("Pong timeout, closing connection");
                let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                    code: 1001,
                    reason: "Pong timeout".into(),
                })));
                break;
            }
        }
    }
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            break;
        }
    }
}

/// Make the connection reachable: local table first so same-process delivery
/// works even if the shared registry write fails (the registry logs that).
pub async fn register_connection(
    state: &AppState,
    identity: &str,
    connection_id: &str,
    handle: ConnectionHandle,
) {
    state.connections.put(connection_id, handle);
    state.registry.add(identity, connection_id).await;

    tracing::debug!(
        connection_id = %connection_id,
        identity = %identity,
        local_connections = state.connections.len(),
        "Connection registered"
    );
}

/// Forget the connection locally and in the shared registry. Both are idempotent,
/// so a connection already evicted at shutdown is fine here.
pub async fn unregister_connection(state: &AppState, identity: &str, connection_id: &str) {
    state.connections.delete(connection_id);
    state.registry.remove(identity, connection_id).await;

    tracing::debug!(
        connection_id = %connection_id,
        identity = %identity,
        "Connection unregistered"
    );
}

/// Bulk eviction: ask every local client to close and drop its registrations.
/// Returns the number of connections evicted.
pub async fn evict_all(state: &AppState, code: u16, reason: &str) -> usize {
    let drained = state.connections.drain();
    for (connection_id, handle) in &drained {
        handle.disconnect(code, reason);
        state.registry.remove(handle.identity(), connection_id).await;
    }

    tracing::info!(evicted = drained.len(), "Evicted local connections");
    drained.len()
}
