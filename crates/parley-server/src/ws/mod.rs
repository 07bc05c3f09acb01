//! WebSocket layer: per-client connections, the room-scoped registry, and
//! session lifecycle from upgrade through disconnect.

pub mod connection;
pub mod registry;
pub mod session;

pub use connection::ClientConnection;
pub use registry::{ConnectionRegistry, RegistryError};
pub use session::ws_handler;
