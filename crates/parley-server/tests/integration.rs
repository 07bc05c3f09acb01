//! End-to-end WebSocket tests against a real listener.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use parley_llm::orchestrator::{ChatOrchestrator, OrchestratorConfig};
use parley_llm::provider::{ChunkStream, Generation, GenerationRequest, Provider, ProviderResult};
use parley_llm::session::ConversationStore;
use parley_rooms::{Room, RoomDirectory, User};
use parley_server::{ParleyServer, ServerConfig};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Provider stub; these tests never reach the chat endpoint.
struct CannedProvider;

#[async_trait]
impl Provider for CannedProvider {
    fn name(&self) -> &str {
        "canned"
    }

    async fn complete(&self, request: &GenerationRequest) -> ProviderResult<Generation> {
        Ok(Generation {
            content: "ok".into(),
            model: request.model.clone(),
        })
    }

    async fn stream(&self, _request: &GenerationRequest) -> ProviderResult<ChunkStream> {
        Ok(Box::pin(futures::stream::empty()))
    }
}

/// Boot a server on an ephemeral port; returns the directory for seeding
/// users and rooms, the WS URL, and the server handle.
async fn boot(config: ServerConfig) -> (Arc<RoomDirectory>, String, Arc<ParleyServer>) {
    let directory = Arc::new(RoomDirectory::new());
    let orchestrator = ChatOrchestrator::new(
        Arc::new(CannedProvider),
        None,
        Arc::new(ConversationStore::default()),
        OrchestratorConfig::default(),
    );
    let server = Arc::new(ParleyServer::new(
        config,
        Arc::clone(&directory),
        Arc::new(orchestrator),
    ));
    let (addr, _handle) = server.listen().await.unwrap();
    (directory, format!("ws://{addr}/ws"), server)
}

fn room_with(directory: &RoomDirectory, names: &[&str]) -> (Room, Vec<User>) {
    let room = directory.create_room("general");
    let users = names
        .iter()
        .map(|name| {
            let user = directory.create_user(*name);
            directory.join(&room.id, &user.id).unwrap();
            user
        })
        .collect();
    (room, users)
}

async fn connect(url: &str, room: &Room, user: &User) -> WsStream {
    let uri = format!("{url}?roomId={}&userId={}", room.id, user.id);
    let (ws, _) = connect_async(uri).await.unwrap();
    ws
}

/// Read the next text frame as JSON, skipping control frames.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("read error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn join_message_and_departure_flow() {
    let (directory, url, _server) = boot(ServerConfig::default()).await;
    let (room, users) = room_with(&directory, &["Ada", "Bea"]);

    let mut ada = connect(&url, &room, &users[0]).await;
    let own_join = read_json(&mut ada).await;
    assert_eq!(own_join["type"], "user_joined");
    assert_eq!(own_join["userId"], users[0].id.as_str());
    assert_eq!(own_join["roomId"], room.id.as_str());

    let mut bea = connect(&url, &room, &users[1]).await;
    let seen_by_ada = read_json(&mut ada).await;
    assert_eq!(seen_by_ada["type"], "user_joined");
    assert_eq!(seen_by_ada["userId"], users[1].id.as_str());
    let seen_by_bea = read_json(&mut bea).await;
    assert_eq!(seen_by_bea["type"], "user_joined");

    // Message fan-out: both members receive it, sequence starts at 1.
    ada.send(Message::text(r#"{"type":"message","body":"hello"}"#))
        .await
        .unwrap();
    for ws in [&mut ada, &mut bea] {
        let msg = read_json(ws).await;
        assert_eq!(msg["type"], "message");
        assert_eq!(msg["seq"], 1);
        assert_eq!(msg["senderName"], "Ada");
        assert_eq!(msg["body"], "hello");
    }

    bea.send(Message::text(r#"{"type":"message","body":"hi back"}"#))
        .await
        .unwrap();
    let second = read_json(&mut ada).await;
    assert_eq!(second["seq"], 2);
    assert_eq!(second["senderName"], "Bea");

    // Departure on close.
    bea.close(None).await.unwrap();
    let left = read_json(&mut ada).await;
    assert_eq!(left["type"], "user_left");
    assert_eq!(left["userId"], users[1].id.as_str());
}

#[tokio::test]
async fn duplicate_connection_is_refused() {
    let (directory, url, server) = boot(ServerConfig::default()).await;
    let (room, users) = room_with(&directory, &["Ada"]);

    let mut first = connect(&url, &room, &users[0]).await;
    let joined = read_json(&mut first).await;
    assert_eq!(joined["type"], "user_joined");

    let mut second = connect(&url, &room, &users[0]).await;
    let refusal = read_json(&mut second).await;
    assert_eq!(refusal["type"], "error");
    assert_eq!(refusal["code"], "already_connected");

    // The original connection is untouched.
    assert_eq!(server.registry().connection_count().await, 1);
    first
        .send(Message::text(r#"{"type":"message","body":"still here"}"#))
        .await
        .unwrap();
    let msg = read_json(&mut first).await;
    assert_eq!(msg["body"], "still here");
}

#[tokio::test]
async fn oversized_frame_is_dropped_with_ack() {
    let config = ServerConfig {
        max_frame_bytes: 256,
        ..ServerConfig::default()
    };
    let (directory, url, _server) = boot(config).await;
    let (room, users) = room_with(&directory, &["Ada", "Bea"]);

    let mut ada = connect(&url, &room, &users[0]).await;
    let _ = read_json(&mut ada).await;
    let mut bea = connect(&url, &room, &users[1]).await;
    let _ = read_json(&mut ada).await;
    let _ = read_json(&mut bea).await;

    let big = format!(r#"{{"type":"message","body":"{}"}}"#, "x".repeat(512));
    ada.send(Message::text(big)).await.unwrap();
    let ack = read_json(&mut ada).await;
    assert_eq!(ack["type"], "error");
    assert_eq!(ack["code"], "oversized");

    // Nothing was stored or fanned out: the next valid message is the
    // first thing Bea sees, and it takes sequence number 1.
    ada.send(Message::text(r#"{"type":"message","body":"small"}"#))
        .await
        .unwrap();
    let next = read_json(&mut bea).await;
    assert_eq!(next["type"], "message");
    assert_eq!(next["seq"], 1);
    assert_eq!(next["body"], "small");
    assert_eq!(directory.history(&room.id, 10).unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_binary_frame_gets_error_ack() {
    let (directory, url, _server) = boot(ServerConfig::default()).await;
    let (room, users) = room_with(&directory, &["Ada"]);

    let mut ws = connect(&url, &room, &users[0]).await;
    let _ = read_json(&mut ws).await;

    ws.send(Message::binary(vec![0xff, 0xfe, 0xfd]))
        .await
        .unwrap();
    let ack = read_json(&mut ws).await;
    assert_eq!(ack["type"], "error");
    assert_eq!(ack["code"], "invalid_frame");
}

#[tokio::test]
async fn unresponsive_client_is_disconnected() {
    let config = ServerConfig {
        heartbeat_interval_secs: 1,
        heartbeat_timeout_secs: 1,
        ..ServerConfig::default()
    };
    let (directory, url, server) = boot(config).await;
    let (room, users) = room_with(&directory, &["Ada"]);

    let mut ws = connect(&url, &room, &users[0]).await;
    let joined = read_json(&mut ws).await;
    assert_eq!(joined["type"], "user_joined");
    assert_eq!(server.registry().connection_count().await, 1);

    // Stop reading entirely; with no pongs flowing back, the server gives
    // up after the ping interval plus timeout and tears the session down.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while server.registry().connection_count().await > 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "client was never disconnected"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
