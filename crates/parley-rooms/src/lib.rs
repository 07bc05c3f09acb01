//! # parley-rooms
//!
//! In-memory catalog of users, rooms, membership, and message history.
//!
//! The [`RoomDirectory`] is the single owner of all `Room` and `Message`
//! entities. Message sequence numbers are assigned here, under each room's
//! own lock, so concurrent senders in the same room can never observe
//! duplicate or out-of-order numbers.
//!
//! Nothing in this crate persists; the whole catalog dies with the process.

#![deny(unsafe_code)]

pub mod directory;
pub mod types;

pub use directory::{MAX_BODY_BYTES, RoomDirectory, RoomError};
pub use types::{Message, Room, User};
