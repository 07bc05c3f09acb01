//! # Provider Trait
//!
//! Core abstraction for generation backends. Every provider implements
//! [`Provider`] to expose a unified request/response and streaming interface,
//! so the orchestrator never sees an HTTP detail.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use parley_core::Turn;
use serde::{Deserialize, Serialize};

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Boxed stream of text chunks returned by [`Provider::stream`].
///
/// The stream ends after the final chunk; an `Err` item means the stream
/// failed mid-flight and no further chunks will arrive.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Errors that can occur during provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SSE stream parsing failed.
    #[error("SSE parse error: {message}")]
    SseParse {
        /// Error description.
        message: String,
    },

    /// Authentication failed (invalid or missing key).
    #[error("Auth error: {message}")]
    Auth {
        /// Error description.
        message: String,
    },

    /// Rate limited by the provider.
    #[error("Rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested retry delay in milliseconds.
        retry_after_ms: u64,
        /// Error description.
        message: String,
    },

    /// The requested model does not exist or is unavailable.
    ///
    /// The orchestrator treats this as the signal to retry with the
    /// configured fallback model.
    #[error("model unavailable: {model}")]
    ModelUnavailable {
        /// The model that was requested.
        model: String,
    },

    /// Provider returned an API error.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
        /// Provider-specific error code.
        code: Option<String>,
        /// Whether this error can be retried.
        retryable: bool,
    },

    /// Provider-specific error.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

impl ProviderError {
    /// Whether this error is transient and worth retrying on the same model.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s == reqwest::StatusCode::TOO_MANY_REQUESTS || s.is_server_error()
                    })
            }
            Self::RateLimited { .. } => true,
            Self::Api { retryable, .. } => *retryable,
            Self::SseParse { .. }
            | Self::Auth { .. }
            | Self::Json(_)
            | Self::ModelUnavailable { .. }
            | Self::Other { .. } => false,
        }
    }

    /// Extract retry-after delay in milliseconds, if available.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms, .. } => Some(*retry_after_ms),
            _ => None,
        }
    }

    /// Error category string for logging and metrics labels.
    pub fn category(&self) -> &str {
        match self {
            Self::Http(_) => "network",
            Self::Json(_) | Self::SseParse { .. } => "parse",
            Self::Auth { .. } => "auth",
            Self::RateLimited { .. } => "rate_limit",
            Self::ModelUnavailable { .. } => "model_unavailable",
            Self::Api { .. } => "api",
            Self::Other { .. } => "unknown",
        }
    }
}

/// A fully composed generation request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Model identifier to generate with.
    pub model: String,
    /// System instructions (already includes any search augmentation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Conversation turns, oldest first; the last turn is the new prompt.
    pub turns: Vec<Turn>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// A completed (non-streaming) generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Full response text.
    pub content: String,
    /// Model that actually produced the response.
    pub model: String,
}

/// Core generation provider trait.
///
/// Implementors must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Generate a complete response.
    async fn complete(&self, request: &GenerationRequest) -> ProviderResult<Generation>;

    /// Stream a response as text chunks.
    ///
    /// The returned future resolves once the provider has accepted the
    /// request; failures after that point surface as `Err` items on the
    /// stream.
    async fn stream(&self, request: &GenerationRequest) -> ProviderResult<ChunkStream>;
}
