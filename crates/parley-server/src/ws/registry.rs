//! Room-scoped connection registry and event fan-out.
//!
//! Connections are keyed by `(room, user)`, so a user holds at most one
//! live connection per room; a second connect attempt for the same pair is
//! rejected rather than silently displacing the first.
//!
//! Fan-out serializes each event once and `try_send`s the shared string to
//! every connection in the room. A connection whose queue is full or whose
//! receiver is gone cannot stall the others; it is removed from the room on
//! the spot and handed back to the caller so a departure can be announced.

use std::collections::HashMap;
use std::sync::Arc;

use parley_core::{ChatEvent, ConnectionId, RoomId, UserId};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::connection::ClientConnection;

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The user already has a live connection to this room.
    #[error("user {user_id} is already connected to room {room_id}")]
    AlreadyConnected {
        /// Target room.
        room_id: RoomId,
        /// Connecting user.
        user_id: UserId,
    },
}

/// Live WebSocket connections indexed by `(room, user)`.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<(RoomId, UserId), Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection, rejecting a duplicate `(room, user)` pair.
    pub async fn add(&self, connection: Arc<ClientConnection>) -> Result<(), RegistryError> {
        let key = (connection.room_id.clone(), connection.user_id.clone());
        let mut conns = self.connections.write().await;
        if conns.contains_key(&key) {
            return Err(RegistryError::AlreadyConnected {
                room_id: key.0,
                user_id: key.1,
            });
        }
        let _ = conns.insert(key, connection);
        Ok(())
    }

    /// Remove the connection for `(room, user)`, if present.
    pub async fn remove(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Option<Arc<ClientConnection>> {
        let mut conns = self.connections.write().await;
        conns.remove(&(room_id.clone(), user_id.clone()))
    }

    /// Fan an event out to every connection in `room_id`, skipping
    /// `exclude` when given.
    ///
    /// Returns the connections that failed to accept the event; they have
    /// already been removed from the registry, and the caller is expected
    /// to announce their departure to the rest of the room.
    pub async fn broadcast(
        &self,
        room_id: &RoomId,
        event: &ChatEvent,
        exclude: Option<&ConnectionId>,
    ) -> Vec<Arc<ClientConnection>> {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(event_type = event.event_type(), error = %e, "failed to serialize event");
                return Vec::new();
            }
        };

        let mut conns = self.connections.write().await;
        let mut departed = Vec::new();
        let recipients: Vec<(RoomId, UserId)> = conns
            .keys()
            .filter(|(rid, _)| rid == room_id)
            .cloned()
            .collect();

        for key in recipients {
            let Some(conn) = conns.get(&key) else { continue };
            if exclude.is_some_and(|id| *id == conn.id) {
                continue;
            }
            if !conn.send(Arc::clone(&json)) {
                warn!(
                    conn_id = %conn.id,
                    room_id = %key.0,
                    user_id = %key.1,
                    dropped = conn.drop_count(),
                    "client cannot keep up, removing from room"
                );
                if let Some(conn) = conns.remove(&key) {
                    departed.push(conn);
                }
            }
        }

        debug!(
            event_type = event.event_type(),
            room_id = %room_id,
            departed = departed.len(),
            "broadcast event to room"
        );
        departed
    }

    /// Total live connections across all rooms.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Live connections in one room.
    pub async fn room_connection_count(&self, room_id: &RoomId) -> usize {
        self.connections
            .read()
            .await
            .keys()
            .filter(|(rid, _)| rid == room_id)
            .count()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
