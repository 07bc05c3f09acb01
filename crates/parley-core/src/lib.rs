//! # parley-core
//!
//! Foundation types and utilities shared by all Parley crates.
//!
//! This crate provides the vocabulary the rest of the workspace depends on:
//!
//! - **Branded IDs**: `UserId`, `RoomId`, `ConnectionId`, `ConversationId`
//!   as newtypes for type safety
//! - **Wire events**: `ChatEvent` enum covering message fan-out,
//!   join/leave notifications, and error acknowledgments
//! - **Conversation turns**: `Role` and `Turn` for AI session history
//! - **Retry math**: exponential backoff building blocks

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod retry;
pub mod turns;

pub use events::ChatEvent;
pub use ids::{ConnectionId, ConversationId, RoomId, UserId};
pub use turns::{Role, Turn};
