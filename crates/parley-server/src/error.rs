//! HTTP error mapping.
//!
//! Domain errors from the rooms and LLM crates are translated here into
//! status codes and a uniform `{"error": {"code", "message"}}` body.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parley_llm::{OrchestratorError, SessionError};
use parley_rooms::RoomError;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

/// Errors surfaced by REST handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Room/user directory error.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// AI chat error.
    #[error(transparent)]
    Chat(#[from] OrchestratorError),

    /// Malformed request input.
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Room(RoomError::RoomNotFound(_)) => (StatusCode::NOT_FOUND, "room_not_found"),
            Self::Room(RoomError::UserNotFound(_)) => (StatusCode::NOT_FOUND, "user_not_found"),
            Self::Room(RoomError::NotMember { .. }) => (StatusCode::FORBIDDEN, "not_member"),
            Self::Room(RoomError::EmptyBody) => (StatusCode::BAD_REQUEST, "empty_body"),
            Self::Room(RoomError::BodyTooLarge) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "body_too_large")
            }
            Self::Chat(OrchestratorError::Session(SessionError::EmptyConversationId)) => {
                (StatusCode::BAD_REQUEST, "invalid_conversation")
            }
            Self::Chat(OrchestratorError::GenerationUnavailable) => {
                (StatusCode::SERVICE_UNAVAILABLE, "generation_unavailable")
            }
            Self::Chat(OrchestratorError::StreamFailed { .. }) => {
                (StatusCode::BAD_GATEWAY, "stream_failed")
            }
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            warn!(code, status = status.as_u16(), "request failed: {self}");
        }
        let body = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}
