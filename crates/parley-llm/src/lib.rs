//! # parley-llm
//!
//! The AI side of Parley: everything between an inbound chat request and
//! the external generation/search services.
//!
//! - [`provider`]: the `Provider` trait and error taxonomy all generation
//!   backends implement
//! - [`openai`]: OpenAI-compatible chat-completions client (JSON + SSE)
//! - [`sse`]: shared Server-Sent Events line parser
//! - [`search`]: the `SearchProvider` trait and a Brave-backed client
//! - [`session`]: per-conversation rolling history with FIFO eviction
//! - [`retry`]: backoff retry for transient provider errors
//! - [`orchestrator`]: composes history + search into provider requests,
//!   handles fallback models and streaming

#![deny(unsafe_code)]

pub mod openai;
pub mod orchestrator;
pub mod provider;
pub mod retry;
pub mod search;
pub mod session;
pub mod sse;

pub use orchestrator::{ChatChunk, ChatOrchestrator, ChatReply, OrchestratorConfig, OrchestratorError};
pub use provider::{ChunkStream, Generation, GenerationRequest, Provider, ProviderError};
pub use search::{SearchError, SearchProvider, SearchResult};
pub use session::{ConversationStore, SessionError};
