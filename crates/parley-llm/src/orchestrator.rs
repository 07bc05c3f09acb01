//! # Chat Orchestrator
//!
//! Composes a generation request from conversation history, optional web
//! search context, and the configured system prompt, then drives the
//! provider with retry and model fallback.
//!
//! Failure discipline: the prompt is appended to history up front, and if
//! generation fails on both the primary and fallback model the appended
//! turn is rolled back, so a failed request leaves the conversation exactly
//! as it found it. Streaming responses are only recorded after the final
//! chunk arrives; a consumer that drops the stream mid-flight records
//! nothing.

use std::sync::{Arc, LazyLock};

use async_stream::stream;
use futures::Stream;
use metrics::counter;
use parley_core::retry::RetryConfig;
use parley_core::{ConversationId, Turn};
use regex::Regex;
use tracing::{info, warn};

use crate::provider::{ChunkStream, Generation, GenerationRequest, Provider, ProviderError};
use crate::retry::with_backoff;
use crate::search::{SearchProvider, SearchResult};
use crate::session::{ConversationStore, SessionError};

/// Orchestrator configuration.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Model tried first for every request.
    pub primary_model: String,
    /// Model tried once when the primary reports itself unavailable.
    pub fallback_model: String,
    /// Base system instructions.
    pub system_prompt: String,
    /// Upper bound on search results injected into the system context.
    pub max_search_results: usize,
    /// Maximum tokens per generation, if bounded.
    pub max_tokens: Option<u32>,
    /// Sampling temperature, if overridden.
    pub temperature: Option<f64>,
    /// Backoff settings for transient provider errors.
    pub retry: RetryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            primary_model: "gpt-4o".into(),
            fallback_model: "gpt-4o-mini".into(),
            system_prompt: "You are a helpful assistant in a group chat. Keep replies concise."
                .into(),
            max_search_results: 3,
            max_tokens: Some(1024),
            temperature: None,
            retry: RetryConfig::default(),
        }
    }
}

/// A completed chat reply.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatReply {
    /// Full response text.
    pub content: String,
    /// Model that produced the response.
    pub model_used: String,
}

/// One item of a streaming chat reply.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatChunk {
    /// A fragment of response text, in order.
    Text(String),
    /// Terminal marker; no chunks follow.
    Done {
        /// Model that produced the response.
        model_used: String,
    },
}

/// Errors surfaced to chat callers.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Invalid session input.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Both the primary and fallback model failed to produce a response.
    #[error("generation unavailable: all models failed")]
    GenerationUnavailable,

    /// The response stream failed after it had started.
    #[error("response stream failed: {message}")]
    StreamFailed {
        /// Underlying failure description.
        message: String,
    },
}

/// Drives providers on behalf of chat requests.
pub struct ChatOrchestrator {
    provider: Arc<dyn Provider>,
    search: Option<Arc<dyn SearchProvider>>,
    store: Arc<ConversationStore>,
    config: OrchestratorConfig,
}

impl ChatOrchestrator {
    /// Create an orchestrator. Pass `search: None` to disable augmentation.
    #[must_use]
    pub fn new(
        provider: Arc<dyn Provider>,
        search: Option<Arc<dyn SearchProvider>>,
        store: Arc<ConversationStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            search,
            store,
            config,
        }
    }

    /// The conversation store backing this orchestrator.
    #[must_use]
    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Produce a complete response for `prompt` within conversation `id`.
    pub async fn respond(
        &self,
        id: &ConversationId,
        prompt: &str,
        enable_search: bool,
    ) -> Result<ChatReply, OrchestratorError> {
        let request = self.prepare(id, prompt, enable_search).await?;

        let generation = match self.complete_with_fallback(&request).await {
            Ok(generation) => generation,
            Err(err) => {
                self.abandon(id, &err);
                return Err(OrchestratorError::GenerationUnavailable);
            }
        };

        self.store.append(id, Turn::assistant(&generation.content))?;
        counter!("chat_responses_total", "model" => generation.model.clone()).increment(1);
        info!(conversation_id = %id, model = %generation.model, "chat response complete");
        Ok(ChatReply {
            content: generation.content,
            model_used: generation.model,
        })
    }

    /// Produce a streaming response for `prompt` within conversation `id`.
    ///
    /// The future resolves once a provider has accepted the request; the
    /// returned stream yields text chunks and ends with [`ChatChunk::Done`].
    /// The assistant turn is recorded only after the stream completes.
    pub async fn respond_stream(
        &self,
        id: &ConversationId,
        prompt: &str,
        enable_search: bool,
    ) -> Result<
        impl Stream<Item = Result<ChatChunk, OrchestratorError>> + Send + use<>,
        OrchestratorError,
    > {
        let request = self.prepare(id, prompt, enable_search).await?;

        let (chunks, model_used) = match self.stream_with_fallback(&request).await {
            Ok(acquired) => acquired,
            Err(err) => {
                self.abandon(id, &err);
                return Err(OrchestratorError::GenerationUnavailable);
            }
        };

        let store = Arc::clone(&self.store);
        let id = id.clone();
        Ok(stream! {
            futures::pin_mut!(chunks);
            let mut content = String::new();
            while let Some(item) = futures::StreamExt::next(&mut chunks).await {
                match item {
                    Ok(text) => {
                        content.push_str(&text);
                        yield Ok(ChatChunk::Text(text));
                    }
                    Err(err) => {
                        // Partial output is discarded; the prompt stays in
                        // history for a retry by the caller.
                        warn!(conversation_id = %id, category = err.category(),
                            "response stream failed mid-flight: {err}");
                        counter!("chat_stream_failures_total").increment(1);
                        yield Err(OrchestratorError::StreamFailed {
                            message: err.to_string(),
                        });
                        return;
                    }
                }
            }

            if let Err(err) = store.append(&id, Turn::assistant(&content)) {
                yield Err(OrchestratorError::Session(err));
                return;
            }
            counter!("chat_responses_total", "model" => model_used.clone()).increment(1);
            info!(conversation_id = %id, model = %model_used, "streamed chat response complete");
            yield Ok(ChatChunk::Done { model_used });
        })
    }

    /// Append the prompt and assemble the full generation request.
    async fn prepare(
        &self,
        id: &ConversationId,
        prompt: &str,
        enable_search: bool,
    ) -> Result<GenerationRequest, OrchestratorError> {
        self.store.append(id, Turn::user(prompt))?;

        let mut system = self.config.system_prompt.clone();
        if enable_search && needs_search(prompt) {
            if let Some(block) = self.search_context(prompt).await {
                system.push_str("\n\n");
                system.push_str(&block);
            }
        }

        Ok(GenerationRequest {
            model: self.config.primary_model.clone(),
            system: Some(system),
            turns: self.store.history(id),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        })
    }

    /// Best-effort search; failures log and degrade to no augmentation.
    async fn search_context(&self, prompt: &str) -> Option<String> {
        let search = self.search.as_ref()?;
        match search.search(prompt, self.config.max_search_results).await {
            Ok(results) if !results.is_empty() => Some(format_search_block(&results)),
            Ok(_) => None,
            Err(err) => {
                warn!("search augmentation failed, continuing without: {err}");
                counter!("search_failures_total").increment(1);
                None
            }
        }
    }

    async fn complete_with_fallback(
        &self,
        request: &GenerationRequest,
    ) -> Result<Generation, ProviderError> {
        match with_backoff(&self.config.retry, || self.provider.complete(request)).await {
            Err(ProviderError::ModelUnavailable { model }) => {
                warn!(
                    primary = %model,
                    fallback = %self.config.fallback_model,
                    "primary model unavailable, trying fallback"
                );
                counter!("model_fallbacks_total").increment(1);
                let fallback = GenerationRequest {
                    model: self.config.fallback_model.clone(),
                    ..request.clone()
                };
                with_backoff(&self.config.retry, || self.provider.complete(&fallback)).await
            }
            other => other,
        }
    }

    async fn stream_with_fallback(
        &self,
        request: &GenerationRequest,
    ) -> Result<(ChunkStream, String), ProviderError> {
        match with_backoff(&self.config.retry, || self.provider.stream(request)).await {
            Ok(chunks) => Ok((chunks, request.model.clone())),
            Err(ProviderError::ModelUnavailable { model }) => {
                warn!(
                    primary = %model,
                    fallback = %self.config.fallback_model,
                    "primary model unavailable, trying fallback"
                );
                counter!("model_fallbacks_total").increment(1);
                let fallback = GenerationRequest {
                    model: self.config.fallback_model.clone(),
                    ..request.clone()
                };
                let chunks =
                    with_backoff(&self.config.retry, || self.provider.stream(&fallback)).await?;
                Ok((chunks, fallback.model))
            }
            Err(err) => Err(err),
        }
    }

    /// Roll back the prompt appended by [`Self::prepare`] after total failure.
    fn abandon(&self, id: &ConversationId, err: &ProviderError) {
        let _ = self.store.pop_last(id);
        counter!("chat_generation_failures_total", "category" => err.category().to_string())
            .increment(1);
        warn!(conversation_id = %id, category = err.category(),
            "generation failed on all models: {err}");
    }
}

static YEAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap_or_else(|_| unreachable!()));

const RECENCY_KEYWORDS: &[&str] = &[
    "today",
    "now",
    "current",
    "latest",
    "recent",
    "news",
    "this week",
    "this month",
    "this year",
];

/// Heuristic for whether a prompt likely needs fresh information.
fn needs_search(prompt: &str) -> bool {
    let lowered = prompt.to_lowercase();
    let word_match = |keyword: &str| {
        lowered
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word == keyword)
    };
    RECENCY_KEYWORDS
        .iter()
        .any(|keyword| word_match(keyword) || (keyword.contains(' ') && lowered.contains(keyword)))
        || YEAR_PATTERN.is_match(&lowered)
}

/// Render search results as a system-context block.
fn format_search_block(results: &[SearchResult]) -> String {
    let mut block = String::from("Relevant web search results:\n");
    for (i, result) in results.iter().enumerate() {
        block.push_str(&format!(
            "{}. {} ({})\n   {}\n",
            i + 1,
            result.title,
            result.url,
            result.snippet
        ));
    }
    block
}
