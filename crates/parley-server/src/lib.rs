//! # parley-server
//!
//! The network surface of Parley: an Axum HTTP API for users, rooms,
//! history, and AI chat, plus a WebSocket endpoint that fans room events
//! out to connected clients.
//!
//! - [`server`]: `ParleyServer`, shared state, and the router
//! - [`routes`]: REST handlers (including SSE chat streaming)
//! - [`ws`]: connection registry, per-client sessions, heartbeat
//! - [`config`]: bind address and tuning knobs
//! - [`shutdown`]: cooperative shutdown via `CancellationToken`
//! - [`health`]: `/health` response assembly

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod ws;

pub use config::ServerConfig;
pub use error::ApiError;
pub use server::{AppState, ParleyServer};
pub use shutdown::ShutdownCoordinator;
