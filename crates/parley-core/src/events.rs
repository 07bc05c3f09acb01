//! Wire events emitted to WebSocket clients.
//!
//! Every frame the server pushes to a connected client is one of these
//! variants, serialized as JSON with a `type` discriminator:
//!
//! ```json
//! {"type":"message","roomId":"r1","seq":1,"senderId":"u1","body":"hi","timestamp":"..."}
//! ```
//!
//! The `error` variant is only ever sent to the connection that caused it;
//! it never reaches a room broadcast.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{RoomId, UserId};

/// An event delivered to WebSocket clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A chat message fanned out to a room.
    #[serde(rename_all = "camelCase")]
    Message {
        /// Room the message belongs to.
        room_id: RoomId,
        /// Room-scoped sequence number, strictly increasing from 1.
        seq: u64,
        /// User who sent the message.
        sender_id: UserId,
        /// Display name of the sender at send time.
        sender_name: String,
        /// Message body text.
        body: String,
        /// Server-side creation time.
        timestamp: DateTime<Utc>,
    },

    /// A user's connection to the room was opened.
    #[serde(rename_all = "camelCase")]
    UserJoined {
        /// Room the user joined.
        room_id: RoomId,
        /// The joining user.
        user_id: UserId,
        /// Display name of the joining user.
        display_name: String,
        /// When the connection opened.
        timestamp: DateTime<Utc>,
    },

    /// A user's connection to the room was closed.
    #[serde(rename_all = "camelCase")]
    UserLeft {
        /// Room the user left.
        room_id: RoomId,
        /// The departing user.
        user_id: UserId,
        /// Display name of the departing user.
        display_name: String,
        /// When the connection closed.
        timestamp: DateTime<Utc>,
    },

    /// Error acknowledgment sent only to the originating connection.
    #[serde(rename_all = "camelCase")]
    Error {
        /// Short machine-readable code (e.g. `"empty_message"`).
        code: String,
        /// Human-readable description.
        message: String,
    },
}

impl ChatEvent {
    /// The wire `type` string of this event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::Error { .. } => "error",
        }
    }

    /// Build an error acknowledgment event.
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn message_wire_format() {
        let event = ChatEvent::Message {
            room_id: "r1".into(),
            seq: 1,
            sender_id: "u1".into(),
            sender_name: "Ada".into(),
            body: "hi".into(),
            timestamp: ts(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["roomId"], "r1");
        assert_eq!(json["seq"], 1);
        assert_eq!(json["senderId"], "u1");
        assert_eq!(json["senderName"], "Ada");
        assert_eq!(json["body"], "hi");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn user_joined_wire_format() {
        let event = ChatEvent::UserJoined {
            room_id: "r1".into(),
            user_id: "u2".into(),
            display_name: "Grace".into(),
            timestamp: ts(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user_joined");
        assert_eq!(json["userId"], "u2");
        assert_eq!(json["displayName"], "Grace");
    }

    #[test]
    fn user_left_wire_format() {
        let event = ChatEvent::UserLeft {
            room_id: "r1".into(),
            user_id: "u2".into(),
            display_name: "Grace".into(),
            timestamp: ts(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user_left");
    }

    #[test]
    fn error_wire_format() {
        let event = ChatEvent::error("empty_message", "message body must not be empty");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "empty_message");
        assert_eq!(json["message"], "message body must not be empty");
    }

    #[test]
    fn event_type_strings() {
        assert_eq!(ChatEvent::error("x", "y").event_type(), "error");
        let joined = ChatEvent::UserJoined {
            room_id: "r".into(),
            user_id: "u".into(),
            display_name: String::new(),
            timestamp: ts(),
        };
        assert_eq!(joined.event_type(), "user_joined");
    }

    #[test]
    fn roundtrip() {
        let event = ChatEvent::Message {
            room_id: "r1".into(),
            seq: 7,
            sender_id: "u1".into(),
            sender_name: "Ada".into(),
            body: "hello".into(),
            timestamp: ts(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: ChatEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let event = ChatEvent::UserJoined {
            room_id: "r".into(),
            user_id: "u".into(),
            display_name: "D".into(),
            timestamp: ts(),
        };
        let json = serde_json::to_value(&event).unwrap();
        let raw = json["timestamp"].as_str().unwrap();
        assert!(raw.parse::<DateTime<Utc>>().is_ok());
    }
}
