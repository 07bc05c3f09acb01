//! REST handlers.
//!
//! All request and response bodies are camelCase JSON. `/api/chat` doubles
//! as a JSON endpoint and an SSE stream depending on the `stream` flag.

use std::convert::Infallible;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use parley_core::{ConversationId, RoomId, Turn, UserId};
use parley_llm::{ChatChunk, OrchestratorError};
use parley_rooms::{Message, Room, User};

use crate::error::ApiError;
use crate::health::{HealthResponse, health_check};
use crate::server::AppState;

/// POST /api/users request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    /// Display name shown to other room members.
    pub display_name: String,
}

/// POST /api/rooms request body.
#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    /// Human-readable room name.
    pub name: String,
}

/// POST /api/rooms/{room_id}/join request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    /// The joining user.
    pub user_id: UserId,
}

/// Query parameters for the room history endpoint.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// Maximum messages to return (capped by server config).
    pub limit: Option<usize>,
}

/// POST /api/chat request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Caller-chosen conversation key.
    pub conversation_id: ConversationId,
    /// The user's prompt.
    pub prompt: String,
    /// Whether to allow web search augmentation.
    #[serde(default)]
    pub enable_search: bool,
    /// Stream the response as SSE instead of a single JSON body.
    #[serde(default)]
    pub stream: bool,
}

/// POST /api/chat JSON response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// Full response text.
    pub content: String,
    /// Model that produced the response.
    pub model_used: String,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.registry.connection_count().await;
    let conversations = state.orchestrator.store().conversation_count();
    Json(health_check(state.start_time, connections, conversations))
}

/// POST /api/users
#[instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    if req.display_name.trim().is_empty() {
        return Err(ApiError::BadRequest("displayName must not be empty".into()));
    }
    let user = state.directory.create_user(req.display_name.trim());
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/rooms
#[instrument(skip_all)]
pub async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<Room>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".into()));
    }
    let room = state.directory.create_room(req.name.trim());
    Ok((StatusCode::CREATED, Json(room)))
}

/// POST /api/rooms/{room_id}/join
///
/// Idempotent: joining a room twice returns the same success response.
#[instrument(skip_all, fields(room_id = %room_id))]
pub async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(req): Json<JoinRoomRequest>,
) -> Result<Json<Room>, ApiError> {
    state.directory.join(&room_id, &req.user_id)?;
    Ok(Json(state.directory.get_room(&room_id)?))
}

/// GET /api/rooms/{room_id}/messages
#[instrument(skip_all, fields(room_id = %room_id))]
pub async fn room_messages(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(state.config.default_history_limit)
        .min(state.config.max_history_limit);
    Ok(Json(state.directory.history(&room_id, limit)?))
}

/// POST /api/chat
#[instrument(skip_all, fields(conversation_id = %req.conversation_id, stream = req.stream))]
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    if req.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".into()));
    }

    if req.stream {
        let chunks = state
            .orchestrator
            .respond_stream(&req.conversation_id, &req.prompt, req.enable_search)
            .await?;
        let events = chunks.map(|item| Ok::<_, Infallible>(sse_event(item)));
        return Ok(Sse::new(events)
            .keep_alive(KeepAlive::default())
            .into_response());
    }

    let reply = state
        .orchestrator
        .respond(&req.conversation_id, &req.prompt, req.enable_search)
        .await?;
    Ok(Json(ChatResponse {
        content: reply.content,
        model_used: reply.model_used,
    })
    .into_response())
}

/// GET /api/conversations/{conversation_id}/history
pub async fn conversation_history(
    State(state): State<AppState>,
    Path(conversation_id): Path<ConversationId>,
) -> Json<Vec<Turn>> {
    Json(state.orchestrator.store().history(&conversation_id))
}

/// DELETE /api/conversations/{conversation_id}/history
pub async fn clear_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<ConversationId>,
) -> Json<serde_json::Value> {
    let cleared = state.orchestrator.store().clear(&conversation_id);
    Json(json!({ "cleared": cleared }))
}

/// Map a stream item to an SSE event.
fn sse_event(item: Result<ChatChunk, OrchestratorError>) -> Event {
    let (name, data) = match item {
        Ok(ChatChunk::Text(delta)) => ("delta", json!({ "delta": delta })),
        Ok(ChatChunk::Done { model_used }) => ("done", json!({ "modelUsed": model_used })),
        Err(err) => ("error", json!({ "message": err.to_string() })),
    };
    Event::default()
        .event(name)
        .json_data(&data)
        .unwrap_or_else(|_| Event::default().event("error"))
}
