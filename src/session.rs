//! Per-session conversation state.
//!
//! A session is created lazily the first time its id is seen and lives for
//! the rest of the process. It holds a bounded history of turns (oldest
//! evicted first) and the upload gate, which only ever goes from `false`
//! to `true`.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::ConversationTurn;

/// Point-in-time copy of one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub uploaded: bool,
    /// Oldest first.
    pub history: Vec<ConversationTurn>,
}

/// Storage for session state, keyed by opaque session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Current state of `session_id`; a never-seen id reads as a fresh session.
    async fn snapshot(&self, session_id: &str) -> SessionSnapshot;

    /// Append a turn, evicting the oldest when over capacity.
    async fn append_turn(&self, session_id: &str, turn: ConversationTurn);

    /// Set the upload gate. Idempotent; never cleared.
    async fn mark_uploaded(&self, session_id: &str);
}

#[derive(Default)]
struct SessionState {
    uploaded: bool,
    history: VecDeque<ConversationTurn>,
}

/// Process-lifetime, in-memory [`SessionStore`].
pub struct InMemorySessionStore {
    capacity: usize,
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl InMemorySessionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn snapshot(&self, session_id: &str) -> SessionSnapshot {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|s| SessionSnapshot {
                uploaded: s.uploaded,
                history: s.history.iter().cloned().collect(),
            })
            .unwrap_or_default()
    }

    async fn append_turn(&self, session_id: &str, turn: ConversationTurn) {
        let mut sessions = self.sessions.write().await;
        let state = sessions.entry(session_id.to_string()).or_default();
        state.history.push_back(turn);
        while state.history.len() > self.capacity {
            state.history.pop_front();
        }
    }

    async fn mark_uploaded(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.entry(session_id.to_string()).or_default().uploaded = true;
    }
}
