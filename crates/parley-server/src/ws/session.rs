//! WebSocket session lifecycle — handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use parley_core::{ChatEvent, RoomId, UserId};
use parley_rooms::{RoomError, User};

use super::connection::ClientConnection;
use super::registry::ConnectionRegistry;
use crate::error::ApiError;
use crate::server::AppState;

/// Frames accepted from clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    /// Post a message to the connection's room.
    Message {
        /// Message body text.
        body: String,
    },
}

/// Query parameters for the `/ws` upgrade.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    /// Room to attach to.
    pub room_id: RoomId,
    /// Connecting user.
    pub user_id: UserId,
}

/// GET /ws — upgrade to a room-attached WebSocket session.
///
/// Membership is validated before the upgrade, so a non-member is refused
/// with a normal HTTP error rather than an immediately-closed socket.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user = state.directory.get_user(&params.user_id)?;
    if !state.directory.is_member(&params.room_id, &params.user_id)? {
        return Err(ApiError::Room(RoomError::NotMember {
            room_id: params.room_id,
            user_id: params.user_id,
        }));
    }
    let room_id = params.room_id;
    Ok(ws.on_upgrade(move |socket| run_ws_session(socket, state, room_id, user)))
}

/// Run a WebSocket session for a connected client.
///
/// 1. Registers with the connection registry (duplicate pairs are refused)
/// 2. Announces the arrival to the room
/// 3. Forwards outbound events and periodic Ping frames
/// 4. Dispatches incoming message frames through the room directory
/// 5. Announces the departure and cleans up on disconnect
#[instrument(skip_all, fields(room_id = %room_id, user_id = %user.id))]
pub async fn run_ws_session(ws: WebSocket, state: AppState, room_id: RoomId, user: User) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(state.config.send_buffer);
    let connection = Arc::new(ClientConnection::new(
        room_id.clone(),
        user.id.clone(),
        user.display_name.clone(),
        send_tx,
    ));

    if let Err(err) = state.registry.add(Arc::clone(&connection)).await {
        info!("refusing duplicate connection: {err}");
        counter!("ws_duplicate_connections_total").increment(1);
        let event = ChatEvent::error("already_connected", err.to_string());
        if let Ok(json) = serde_json::to_string(&event) {
            let _ = ws_tx.send(Message::Text(json.into())).await;
        }
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }

    let connection_start = std::time::Instant::now();
    info!(conn_id = %connection.id, "client connected");
    counter!("ws_connections_total").increment(1);
    gauge!("ws_connections_active").increment(1.0);

    let joined = ChatEvent::UserJoined {
        room_id: room_id.clone(),
        user_id: user.id.clone(),
        display_name: user.display_name.clone(),
        timestamp: Utc::now(),
    };
    let departed = state.registry.broadcast(&room_id, &joined, None).await;
    announce_departures(&state.registry, &room_id, departed).await;

    // Outbound forwarder with periodic Ping frames.
    let ping_interval = Duration::from_secs(state.config.heartbeat_interval_secs);
    let pong_timeout = Duration::from_secs(state.config.heartbeat_timeout_secs);
    let outbound_conn = Arc::clone(&connection);
    let mut outbound = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        // Skip the immediate first tick
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                event = send_rx.recv() => {
                    match event {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > pong_timeout
                    {
                        warn!("client unresponsive for {pong_timeout:?}, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Inbound loop. Also ends when the outbound half stops, which is how
    // an unresponsive client gets disconnected after the pong timeout.
    loop {
        let frame = tokio::select! {
            _ = &mut outbound => break,
            frame = ws_rx.next() => match frame {
                Some(Ok(frame)) => frame,
                _ => break,
            },
        };

        let text = match frame {
            Message::Text(ref t) => Some(t.to_string()),
            Message::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(s) => Some(s.to_string()),
                Err(_) => {
                    debug!(len = data.len(), "rejecting non-UTF8 binary frame");
                    let event =
                        ChatEvent::error("invalid_frame", "binary frame is not valid UTF-8");
                    send_to_self(&connection, &event);
                    None
                }
            },
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                None
            }
        };
        let Some(text) = text else { continue };
        connection.mark_alive();

        if text.len() > state.config.max_frame_bytes {
            counter!("ws_oversized_frames_total").increment(1);
            let event = ChatEvent::error(
                "oversized",
                format!("frame exceeds {} bytes", state.config.max_frame_bytes),
            );
            send_to_self(&connection, &event);
            continue;
        }

        match serde_json::from_str::<ClientFrame>(&text) {
            Ok(ClientFrame::Message { body }) => {
                handle_chat_message(&state, &connection, body).await;
            }
            Err(e) => {
                let event = ChatEvent::error("invalid_frame", format!("unrecognized frame: {e}"));
                send_to_self(&connection, &event);
            }
        }
    }

    // Clean up.
    info!(conn_id = %connection.id, "client disconnected");
    counter!("ws_disconnections_total").increment(1);
    gauge!("ws_connections_active").decrement(1.0);
    histogram!("ws_connection_duration_seconds").record(connection_start.elapsed().as_secs_f64());
    outbound.abort();

    // If the registry already evicted this connection as a slow consumer,
    // the departure has been announced by whoever evicted it.
    if state
        .registry
        .remove(&connection.room_id, &connection.user_id)
        .await
        .is_some()
    {
        let left = departure_event(&connection);
        let departed = state.registry.broadcast(&room_id, &left, None).await;
        announce_departures(&state.registry, &room_id, departed).await;
    }
}

/// Append a chat message and fan it out; errors go back to the sender only.
async fn handle_chat_message(state: &AppState, connection: &Arc<ClientConnection>, body: String) {
    match state
        .directory
        .append_message(&connection.room_id, &connection.user_id, body)
    {
        Ok(message) => {
            counter!("room_messages_total").increment(1);
            let event = ChatEvent::Message {
                room_id: message.room_id.clone(),
                seq: message.seq,
                sender_id: message.sender_id,
                sender_name: message.sender_name,
                body: message.body,
                timestamp: message.timestamp,
            };
            let departed = state
                .registry
                .broadcast(&message.room_id, &event, None)
                .await;
            announce_departures(&state.registry, &message.room_id, departed).await;
        }
        Err(err) => {
            let event = ChatEvent::error(room_error_code(&err), err.to_string());
            send_to_self(connection, &event);
        }
    }
}

/// Broadcast `user_left` for evicted connections, following any cascade.
///
/// Announcing a departure can itself overflow another slow client's queue,
/// so this loops until a broadcast round evicts nobody.
pub(crate) async fn announce_departures(
    registry: &ConnectionRegistry,
    room_id: &RoomId,
    mut departed: Vec<Arc<ClientConnection>>,
) {
    while !departed.is_empty() {
        let mut next = Vec::new();
        for conn in departed {
            counter!("ws_evicted_slow_clients_total").increment(1);
            let event = departure_event(&conn);
            next.extend(registry.broadcast(room_id, &event, None).await);
        }
        departed = next;
    }
}

fn departure_event(connection: &ClientConnection) -> ChatEvent {
    ChatEvent::UserLeft {
        room_id: connection.room_id.clone(),
        user_id: connection.user_id.clone(),
        display_name: connection.display_name.clone(),
        timestamp: Utc::now(),
    }
}

/// Deliver an error acknowledgment to the originating connection only.
fn send_to_self(connection: &ClientConnection, event: &ChatEvent) {
    if let Ok(json) = serde_json::to_string(event) {
        let _ = connection.send(Arc::new(json));
    }
}

fn room_error_code(err: &RoomError) -> &'static str {
    match err {
        RoomError::RoomNotFound(_) => "room_not_found",
        RoomError::UserNotFound(_) => "user_not_found",
        RoomError::NotMember { .. } => "not_member",
        RoomError::EmptyBody => "empty_body",
        RoomError::BodyTooLarge => "body_too_large",
    }
}
