//! Entity types owned by the room directory.

use chrono::{DateTime, Utc};
use parley_core::{RoomId, UserId};
use serde::{Deserialize, Serialize};

/// A registered user.
///
/// Immutable after creation; destroyed only by process restart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Server-generated identifier.
    pub id: UserId,
    /// Display name chosen at creation.
    pub display_name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A snapshot of a chat room.
///
/// `members` preserves join order for display; membership tests inside the
/// directory use set semantics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Server-generated identifier.
    pub id: RoomId,
    /// Room name chosen at creation.
    pub name: String,
    /// Member user IDs in join order.
    pub members: Vec<UserId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A chat message. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Room this message belongs to.
    pub room_id: RoomId,
    /// Room-scoped sequence number, strictly increasing from 1.
    pub seq: u64,
    /// Sending user.
    pub sender_id: UserId,
    /// Display name of the sender at send time.
    pub sender_name: String,
    /// Body text.
    pub body: String,
    /// Server-side creation time.
    pub timestamp: DateTime<Utc>,
}
