//! # Conversation Sessions
//!
//! In-memory per-conversation history with a rolling FIFO cap.
//!
//! Conversation IDs are caller-supplied and opaque; a session springs into
//! existence on first append and holds at most `cap` turns, evicting the
//! oldest turn once the cap is exceeded. All operations on a single
//! conversation are serialized through its own mutex, so interleaved
//! appends from concurrent requests never corrupt ordering.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use parley_core::{ConversationId, Turn};
use tracing::debug;

/// Default maximum number of turns retained per conversation.
pub const DEFAULT_SESSION_CAP: usize = 40;

/// Errors from session store operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Conversation IDs must be non-empty.
    #[error("conversation id must not be empty")]
    EmptyConversationId,
}

/// Thread-safe store of per-conversation histories.
pub struct ConversationStore {
    cap: usize,
    sessions: RwLock<HashMap<ConversationId, Arc<Mutex<VecDeque<Turn>>>>>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_CAP)
    }
}

impl ConversationStore {
    /// Create a store retaining at most `cap` turns per conversation.
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// The per-conversation turn cap.
    #[must_use]
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Number of live conversations.
    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.sessions.read().len()
    }

    fn session(&self, id: &ConversationId) -> Arc<Mutex<VecDeque<Turn>>> {
        if let Some(session) = self.sessions.read().get(id) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write();
        Arc::clone(
            sessions
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new()))),
        )
    }

    /// Append a turn, evicting the oldest while over the cap.
    pub fn append(&self, id: &ConversationId, turn: Turn) -> Result<(), SessionError> {
        validate(id)?;
        let session = self.session(id);
        let mut turns = session.lock();
        turns.push_back(turn);
        while turns.len() > self.cap {
            let _ = turns.pop_front();
            debug!(conversation_id = %id, "evicted oldest turn at cap");
        }
        Ok(())
    }

    /// Remove and return the most recent turn, if any.
    ///
    /// Used by the orchestrator to undo a prompt append when generation
    /// fails outright, so failed attempts leave no trace in history.
    pub fn pop_last(&self, id: &ConversationId) -> Option<Turn> {
        let session = self.sessions.read().get(id).map(Arc::clone)?;
        let mut turns = session.lock();
        turns.pop_back()
    }

    /// Snapshot of the conversation history, oldest first.
    ///
    /// Unknown conversations yield an empty history.
    #[must_use]
    pub fn history(&self, id: &ConversationId) -> Vec<Turn> {
        self.sessions
            .read()
            .get(id)
            .map(|session| session.lock().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop a conversation's history entirely.
    ///
    /// Returns `true` if the conversation existed.
    pub fn clear(&self, id: &ConversationId) -> bool {
        self.sessions.write().remove(id).is_some()
    }
}

fn validate(id: &ConversationId) -> Result<(), SessionError> {
    if id.as_str().is_empty() {
        return Err(SessionError::EmptyConversationId);
    }
    Ok(())
}
