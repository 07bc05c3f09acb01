//! Branded ID newtypes for type safety.
//!
//! Every entity in the Parley system has a distinct ID type implemented as a
//! newtype wrapper around `String`. This prevents accidentally passing a
//! room ID where a user ID is expected.
//!
//! Server-generated IDs are UUID v7 (time-ordered) via [`uuid::Uuid::now_v7`].
//! `ConversationId` is the exception: it is caller-supplied and opaque, so it
//! only wraps whatever string the client chose.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a new UUID v7 string (time-ordered).
fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id!(
    /// Identifies a registered user.
    UserId
);

branded_id!(
    /// Identifies a chat room.
    RoomId
);

branded_id!(
    /// Identifies a live WebSocket connection.
    ConnectionId
);

branded_id!(
    /// Caller-supplied key scoping AI conversation memory.
    ///
    /// Opaque — the server never generates these and performs no validation
    /// beyond non-emptiness at the session store boundary.
    ConversationId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn new_ids_are_unique() {
        let a = UserId::new();
        let b = UserId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn new_ids_are_valid_uuids() {
        let id = RoomId::new();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn v7_ids_are_time_ordered() {
        // UUID v7 sorts lexicographically by creation time
        let first = ConnectionId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = ConnectionId::new();
        assert!(first.as_str() < second.as_str());
    }

    #[test]
    fn from_string_preserves_value() {
        let id = ConversationId::from_string("c1".into());
        assert_eq!(id.as_str(), "c1");
        assert_eq!(id.into_inner(), "c1");
    }

    #[test]
    fn from_str_and_display() {
        let id = UserId::from("u_42");
        assert_eq!(id.to_string(), "u_42");
    }

    #[test]
    fn serde_transparent() {
        let id = RoomId::from("r1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"r1\"");
        let back: RoomId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn usable_as_hash_key() {
        let mut set = HashSet::new();
        assert!(set.insert(UserId::from("a")));
        assert!(!set.insert(UserId::from("a")));
        assert!(set.insert(UserId::from("b")));
    }

    #[test]
    fn deref_to_str() {
        let id = ConversationId::from("conv");
        assert!(id.starts_with("co"));
        assert_eq!(&*id, "conv");
    }

    #[test]
    fn distinct_types_do_not_compare() {
        // Compile-time property: UserId and RoomId are different types.
        // This test only documents the intent.
        let user = UserId::from("x");
        let room = RoomId::from("x");
        assert_eq!(user.as_str(), room.as_str());
    }
}
