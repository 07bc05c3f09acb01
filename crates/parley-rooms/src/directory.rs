//! The room directory — the single holder of mutable room/user state.
//!
//! Locking layout: a `parking_lot::RwLock` map for users, one for the room
//! catalog, and a per-room `Mutex` guarding membership, history, and the
//! sequence counter. All appends for a room run under that room's mutex, so
//! sequence assignment is serialized per room while different rooms proceed
//! independently. No lock is ever held across an await point.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use parley_core::{RoomId, UserId};
use thiserror::Error;
use tracing::debug;

use crate::types::{Message, Room, User};

/// Maximum messages retained per room; oldest are dropped beyond this.
/// Evicted messages keep their sequence numbers, so clients never see a
/// renumbering, only a shorter replay window.
const MAX_HISTORY: usize = 1000;

/// Maximum message body size in bytes. Oversized bodies are rejected
/// before a sequence number is assigned.
pub const MAX_BODY_BYTES: usize = 16 * 1024;

/// Errors from directory operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),

    /// The user does not exist.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// The user is not a member of the room.
    #[error("user {user_id} is not a member of room {room_id}")]
    NotMember {
        /// Target room.
        room_id: RoomId,
        /// Acting user.
        user_id: UserId,
    },

    /// A message body was empty or whitespace-only.
    #[error("message body must not be empty")]
    EmptyBody,

    /// A message body exceeded [`MAX_BODY_BYTES`].
    #[error("message body exceeds {MAX_BODY_BYTES} bytes")]
    BodyTooLarge,
}

/// Per-room mutable state, guarded by the room's own mutex.
struct RoomInner {
    /// Join order preserved; contains no duplicates.
    members: Vec<UserId>,
    history: Vec<Message>,
    next_seq: u64,
}

struct RoomState {
    room_id: RoomId,
    name: String,
    created_at: chrono::DateTime<Utc>,
    inner: Mutex<RoomInner>,
}

/// In-memory catalog of users, rooms, and message history.
///
/// Create one at startup and share it behind an `Arc`; every component that
/// needs room state goes through this interface.
pub struct RoomDirectory {
    users: RwLock<HashMap<UserId, User>>,
    rooms: RwLock<HashMap<RoomId, Arc<RoomState>>>,
}

impl RoomDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    // ── Users ────────────────────────────────────────────────────────────

    /// Register a new user with a server-generated ID.
    pub fn create_user(&self, display_name: impl Into<String>) -> User {
        let user = User {
            id: UserId::new(),
            display_name: display_name.into(),
            created_at: Utc::now(),
        };
        let _ = self
            .users
            .write()
            .insert(user.id.clone(), user.clone());
        debug!(user_id = %user.id, "user created");
        user
    }

    /// Look up a user by ID.
    pub fn get_user(&self, user_id: &UserId) -> Result<User, RoomError> {
        self.users
            .read()
            .get(user_id)
            .cloned()
            .ok_or_else(|| RoomError::UserNotFound(user_id.clone()))
    }

    // ── Rooms ────────────────────────────────────────────────────────────

    /// Create a new room with a server-generated ID.
    pub fn create_room(&self, name: impl Into<String>) -> Room {
        let state = Arc::new(RoomState {
            room_id: RoomId::new(),
            name: name.into(),
            created_at: Utc::now(),
            inner: Mutex::new(RoomInner {
                members: Vec::new(),
                history: Vec::new(),
                next_seq: 1,
            }),
        });
        let room = Self::snapshot(&state);
        let _ = self
            .rooms
            .write()
            .insert(state.room_id.clone(), state);
        debug!(room_id = %room.id, name = %room.name, "room created");
        room
    }

    /// Fetch a snapshot of a room (metadata plus member list).
    pub fn get_room(&self, room_id: &RoomId) -> Result<Room, RoomError> {
        let state = self.room_state(room_id)?;
        Ok(Self::snapshot(&state))
    }

    /// Add a user to a room.
    ///
    /// Joining twice is a no-op success — a returning client must not be
    /// blocked by its own earlier join.
    pub fn join(&self, room_id: &RoomId, user_id: &UserId) -> Result<(), RoomError> {
        // Validate the user outside the room lock.
        let _ = self.get_user(user_id)?;
        let state = self.room_state(room_id)?;
        let mut inner = state.inner.lock();
        if !inner.members.contains(user_id) {
            inner.members.push(user_id.clone());
            debug!(room_id = %room_id, user_id = %user_id, "user joined room");
        }
        Ok(())
    }

    /// Whether the user is a member of the room.
    pub fn is_member(&self, room_id: &RoomId, user_id: &UserId) -> Result<bool, RoomError> {
        let state = self.room_state(room_id)?;
        let inner = state.inner.lock();
        Ok(inner.members.contains(user_id))
    }

    // ── Messages ─────────────────────────────────────────────────────────

    /// Append a message to a room's history, assigning its sequence number.
    ///
    /// Sequence assignment and the history append happen under the room's
    /// mutex, so numbers are gap-free and strictly increasing even under
    /// concurrent senders.
    pub fn append_message(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        body: impl Into<String>,
    ) -> Result<Message, RoomError> {
        let body = body.into();
        if body.trim().is_empty() {
            return Err(RoomError::EmptyBody);
        }
        if body.len() > MAX_BODY_BYTES {
            return Err(RoomError::BodyTooLarge);
        }
        let sender = self.get_user(user_id)?;
        let state = self.room_state(room_id)?;

        let mut inner = state.inner.lock();
        if !inner.members.contains(user_id) {
            return Err(RoomError::NotMember {
                room_id: room_id.clone(),
                user_id: user_id.clone(),
            });
        }

        let message = Message {
            room_id: room_id.clone(),
            seq: inner.next_seq,
            sender_id: sender.id,
            sender_name: sender.display_name,
            body,
            timestamp: Utc::now(),
        };
        inner.next_seq += 1;
        inner.history.push(message.clone());
        if inner.history.len() > MAX_HISTORY {
            let excess = inner.history.len() - MAX_HISTORY;
            inner.history.drain(..excess);
        }
        Ok(message)
    }

    /// The most recent `limit` messages of a room, in chronological order.
    pub fn history(&self, room_id: &RoomId, limit: usize) -> Result<Vec<Message>, RoomError> {
        let state = self.room_state(room_id)?;
        let inner = state.inner.lock();
        let start = inner.history.len().saturating_sub(limit);
        Ok(inner.history[start..].to_vec())
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn room_state(&self, room_id: &RoomId) -> Result<Arc<RoomState>, RoomError> {
        self.rooms
            .read()
            .get(room_id)
            .cloned()
            .ok_or_else(|| RoomError::RoomNotFound(room_id.clone()))
    }

    fn snapshot(state: &RoomState) -> Room {
        let inner = state.inner.lock();
        Room {
            id: state.room_id.clone(),
            name: state.name.clone(),
            members: inner.members.clone(),
            created_at: state.created_at,
        }
    }
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}
