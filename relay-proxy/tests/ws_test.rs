//! WebSocket chat tests against a live listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use relay_proxy::{
    auth::JwtVerifier, config::DEV_JWT_SECRET, providers::build_registry, serve, AppState,
    ServerConfig,
};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start() -> (SocketAddr, Arc<AppState>) {
    let config = ServerConfig::default();
    let providers = build_registry(&config).await.unwrap();
    let state = Arc::new(AppState::new(config, providers));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, state.clone(), std::future::pending()));

    (addr, state)
}

async fn connect(addr: SocketAddr, path: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{}{}", addr, path)).await.unwrap();
    ws
}

/// Connect and wait until the server has registered the connection
async fn join(addr: SocketAddr, state: &AppState, client_id: &str) -> Client {
    let before = state.connections.connections_for(client_id);
    let ws = connect(addr, &format!("/api/v1/ws/{}", client_id)).await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while state.connections.connections_for(client_id) == before {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection was never registered");
    ws
}

async fn next_message(ws: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for a message")
        .expect("stream ended")
        .expect("websocket error")
}

async fn next_text(ws: &mut Client) -> String {
    loop {
        match next_message(ws).await {
            Message::Text(text) => return text,
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected text, got {:?}", other),
        }
    }
}

async fn expect_close(ws: &mut Client, code: u16) {
    match next_message(ws).await {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), code),
        other => panic!("expected close {}, got {:?}", code, other),
    }
}

#[tokio::test]
async fn test_sender_gets_ack() {
    let (addr, state) = start().await;
    let mut alice = join(addr, &state, "alice").await;

    alice.send(Message::Text("hi".into())).await.unwrap();
    assert_eq!(next_text(&mut alice).await, "You wrote: hi");
}

#[tokio::test]
async fn test_message_is_broadcast_to_other_clients() {
    let (addr, state) = start().await;
    let mut alice = join(addr, &state, "alice").await;
    let mut bob = join(addr, &state, "bob").await;

    alice.send(Message::Text("hello".into())).await.unwrap();

    assert_eq!(next_text(&mut alice).await, "You wrote: hello");
    assert_eq!(next_text(&mut bob).await, "Client alice says: hello");
}

#[tokio::test]
async fn test_departure_is_announced() {
    let (addr, state) = start().await;
    let mut alice = join(addr, &state, "alice").await;
    let mut bob = join(addr, &state, "bob").await;

    bob.close(None).await.unwrap();

    assert_eq!(next_text(&mut alice).await, "Client bob left the chat");
    assert!(!state.connections.is_connected("bob"));
    assert!(state.connections.is_connected("alice"));
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let (addr, state) = start().await;
    let mut ws = connect(addr, "/api/v1/ws/mallory?token=not-a-jwt").await;

    expect_close(&mut ws, 1008).await;
    assert!(!state.connections.is_connected("mallory"));
}

#[tokio::test]
async fn test_valid_token_is_accepted() {
    let (addr, state) = start().await;
    let token = JwtVerifier::new(DEV_JWT_SECRET)
        .issue("carol", Duration::from_secs(60))
        .unwrap();

    let mut ws = connect(addr, &format!("/api/v1/ws/carol?token={}", token)).await;
    ws.send(Message::Text("ping".into())).await.unwrap();

    assert_eq!(next_text(&mut ws).await, "You wrote: ping");
    assert!(state.connections.is_connected("carol"));
}

#[tokio::test]
async fn test_token_for_another_subject_is_not_enforced() {
    let (addr, state) = start().await;
    let token = JwtVerifier::new(DEV_JWT_SECRET)
        .issue("carol", Duration::from_secs(60))
        .unwrap();

    let mut ws = connect(addr, &format!("/api/v1/ws/dave?token={}", token)).await;
    ws.send(Message::Text("hi".into())).await.unwrap();

    assert_eq!(next_text(&mut ws).await, "You wrote: hi");
    assert!(state.connections.is_connected("dave"));
    assert!(!state.connections.is_connected("carol"));
}

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let (addr, state) = start().await;
    let mut alice = join(addr, &state, "alice").await;

    state.shutdown.cancel();

    expect_close(&mut alice, 1001).await;
}
