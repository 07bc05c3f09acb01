//! `ParleyServer` — Axum HTTP + WebSocket server.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_llm::ChatOrchestrator;
use parley_rooms::RoomDirectory;

use crate::config::ServerConfig;
use crate::routes;
use crate::shutdown::ShutdownCoordinator;
use crate::ws;
use crate::ws::registry::ConnectionRegistry;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Users, rooms, and message history.
    pub directory: Arc<RoomDirectory>,
    /// Live WebSocket connections.
    pub registry: Arc<ConnectionRegistry>,
    /// AI response orchestrator.
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Server tuning knobs.
    pub config: Arc<ServerConfig>,
}

/// The main Parley server.
pub struct ParleyServer {
    state: AppState,
}

impl ParleyServer {
    /// Create a new server around shared room and AI state.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        directory: Arc<RoomDirectory>,
        orchestrator: Arc<ChatOrchestrator>,
    ) -> Self {
        Self {
            state: AppState {
                directory,
                registry: Arc::new(ConnectionRegistry::new()),
                orchestrator,
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                config: Arc::new(config),
            },
        }
    }

    /// Build the Axum router with all routes.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .route("/ws", get(ws::ws_handler))
            .route("/api/users", post(routes::create_user))
            .route("/api/rooms", post(routes::create_room))
            .route("/api/rooms/{room_id}/join", post(routes::join_room))
            .route("/api/rooms/{room_id}/messages", get(routes::room_messages))
            .route("/api/chat", post(routes::chat))
            .route(
                "/api/conversations/{conversation_id}/history",
                get(routes::conversation_history).delete(routes::clear_conversation),
            )
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// The shutdown coordinator.
    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.registry
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Bind and return the local address plus the serving task.
    ///
    /// The task runs until shutdown is signalled through the coordinator.
    pub async fn listen(
        &self,
    ) -> std::io::Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind(self.state.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "server listening");

        let token = self.state.shutdown.token();
        let router = self.router();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
            {
                tracing::error!(error = %e, "server exited with error");
            }
        });
        Ok((addr, handle))
    }

    /// Bind and serve until shutdown is signalled.
    pub async fn serve(&self) -> std::io::Result<()> {
        let (_addr, handle) = self.listen().await?;
        handle.await.map_err(std::io::Error::other)
    }
}
