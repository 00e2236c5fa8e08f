//! Integration tests for WebSocket admission, registration, cleanup and eviction.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use relay_server::auth::{AdmissionController, SessionInfo, SessionValidator};
use relay_server::error::AdmissionError;
use relay_server::registry::{MemoryStore, SessionRegistry, DEFAULT_KEY_PREFIX};
use relay_server::shutdown::{self, ShutdownSignal};
use relay_server::state::AppState;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const VALID_TOKEN: &str = "valid-token";

/// Accepts one token, answers empty for "empty-token", rejects the rest.
struct FakeAuth;

#[async_trait]
impl SessionValidator for FakeAuth {
    async fn validate_session(
        &self,
        token: &str,
        _identity: &str,
        _strict: bool,
    ) -> Result<Option<SessionInfo>, AdmissionError> {
        match token {
            VALID_TOKEN => Ok(Some(SessionInfo {
                account_id: 7,
                user_name: "tester".to_string(),
            })),
            "empty-token" => Ok(None),
            _ => Err(AdmissionError::Rejected("invalid token".to_string())),
        }
    }
}

/// Helper: start the server on a random port and return (addr, state).
async fn start_test_server() -> (SocketAddr, AppState) {
    let registry = SessionRegistry::new(Arc::new(MemoryStore::new()), DEFAULT_KEY_PREFIX);
    let admission = AdmissionController::new(Arc::new(FakeAuth), Duration::from_secs(1));
    let state = AppState::new(registry, admission);

    let app = relay_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Open a WebSocket with the given handshake headers.
async fn connect(addr: SocketAddr, token: Option<&str>, profile_id: Option<&str>) -> Client {
    let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    if let Some(token) = token {
        request.headers_mut().insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
    }
    if let Some(profile_id) = profile_id {
        request
            .headers_mut()
            .insert("profileid", HeaderValue::from_str(profile_id).unwrap());
    }

    let (ws_stream, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("WebSocket handshake failed");
    ws_stream
}

/// Registration happens on the connection task, so poll until it lands.
async fn wait_for_registrations(state: &AppState, identity: &str, expected: usize) {
    for _ in 0..100 {
        if state.registry.lookup(identity).await.len() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} never reached {} registrations", identity, expected);
}

/// Read frames until a close frame arrives and return its code.
async fn expect_close_code(client: &mut Client) -> u16 {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timed out waiting for close frame");
        match frame {
            Some(Ok(Message::Close(Some(close)))) => return u16::from(close.code),
            Some(Ok(Message::Close(None))) | None | Some(Err(_)) => {
                panic!("Connection ended without a close code")
            }
            Some(Ok(_)) => continue,
        }
    }
}

#[tokio::test]
async fn test_valid_connection_is_registered() {
    let (addr, state) = start_test_server().await;
    let _client = connect(addr, Some(VALID_TOKEN), Some("321")).await;

    wait_for_registrations(&state, "321", 1).await;
    assert_eq!(state.connections.len(), 1);
}

#[tokio::test]
async fn test_rejected_token_closes_without_registering() {
    let (addr, state) = start_test_server().await;
    let mut client = connect(addr, Some("forged"), Some("321")).await;

    assert_eq!(expect_close_code(&mut client).await, 4002);
    assert!(state.registry.lookup("321").await.is_empty());
    assert!(state.connections.is_empty());
}

#[tokio::test]
async fn test_empty_session_is_rejected() {
    let (addr, state) = start_test_server().await;
    let mut client = connect(addr, Some("empty-token"), Some("321")).await;

    assert_eq!(expect_close_code(&mut client).await, 4002);
    assert!(state.connections.is_empty());
}

#[tokio::test]
async fn test_missing_headers_close_with_missing_credentials() {
    let (addr, state) = start_test_server().await;

    let mut no_token = connect(addr, None, Some("321")).await;
    assert_eq!(expect_close_code(&mut no_token).await, 4001);

    let mut no_identity = connect(addr, Some(VALID_TOKEN), None).await;
    assert_eq!(expect_close_code(&mut no_identity).await, 4001);

    assert!(state.connections.is_empty());
}

#[tokio::test]
async fn test_disconnect_removes_registration() {
    let (addr, state) = start_test_server().await;
    let mut client = connect(addr, Some(VALID_TOKEN), Some("321")).await;
    wait_for_registrations(&state, "321", 1).await;

    client.close(None).await.unwrap();

    wait_for_registrations(&state, "321", 0).await;
    for _ in 0..100 {
        if state.connections.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Connection table never emptied");
}

#[tokio::test]
async fn test_same_identity_twice_keeps_both_connections() {
    let (addr, state) = start_test_server().await;
    let mut first = connect(addr, Some(VALID_TOKEN), Some("321")).await;
    let _second = connect(addr, Some(VALID_TOKEN), Some("321")).await;

    wait_for_registrations(&state, "321", 2).await;
    assert_eq!(state.connections.len(), 2);

    // Closing one leaves the other registered
    first.close(None).await.unwrap();
    wait_for_registrations(&state, "321", 1).await;
}

#[tokio::test]
async fn test_client_frames_do_not_disturb_connection() {
    let (addr, state) = start_test_server().await;
    let mut client = connect(addr, Some(VALID_TOKEN), Some("321")).await;
    wait_for_registrations(&state, "321", 1).await;

    let event = json!({"event": "notification", "data": {"seen": true}});
    client.send(Message::Text(event.to_string().into())).await.unwrap();
    client.send(Message::Text("not json".into())).await.unwrap();
    client.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.registry.lookup("321").await.len(), 1);
}

#[tokio::test]
async fn test_evict_all_closes_clients_and_unregisters() {
    let (addr, state) = start_test_server().await;
    let mut client = connect(addr, Some(VALID_TOKEN), Some("321")).await;
    wait_for_registrations(&state, "321", 1).await;

    let evicted =
        relay_server::ws::actor::evict_all(&state, 1001, "server shutting down").await;

    assert_eq!(evicted, 1);
    assert_eq!(expect_close_code(&mut client).await, 1001);
    assert!(state.registry.lookup("321").await.is_empty());
}

#[tokio::test]
async fn test_health_reports_connections_and_registry() {
    let (addr, state) = start_test_server().await;
    let _client = connect(addr, Some(VALID_TOKEN), Some("321")).await;
    wait_for_registrations(&state, "321", 1).await;

    let body: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 1);
    assert_eq!(body["registry"], "memory");
}

#[tokio::test]
async fn test_wind_down_stops_accepting_before_evicting() {
    let registry = SessionRegistry::new(Arc::new(MemoryStore::new()), DEFAULT_KEY_PREFIX);
    let admission = AdmissionController::new(Arc::new(FakeAuth), Duration::from_secs(1));
    let state = AppState::new(registry, admission);
    let signal = ShutdownSignal::new();

    let app = relay_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stop = signal.wait();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(stop)
            .await
            .unwrap();
    });

    let mut client = connect(addr, Some(VALID_TOKEN), Some("321")).await;
    wait_for_registrations(&state, "321", 1).await;

    let mut listeners = [server];
    let evicted =
        shutdown::wind_down(&state, &signal, &mut listeners, Duration::from_secs(2)).await;

    assert_eq!(evicted, 1);
    assert_eq!(expect_close_code(&mut client).await, 1001);

    // The listener is gone, so nothing can register behind the eviction
    let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("authorization", HeaderValue::from_static(VALID_TOKEN));
    request
        .headers_mut()
        .insert("profileid", HeaderValue::from_static("322"));
    assert!(tokio_tungstenite::connect_async(request).await.is_err());

    assert!(state.connections.is_empty());
    assert!(state.registry.lookup("321").await.is_empty());
    assert!(state.registry.lookup("322").await.is_empty());
}
