//! In-memory conversation store for tests and embedding.

use super::{ConversationStore, Message, NewMessage, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory store backed by a per-session message vector.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Vec<Message>>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages stored for a session.
    pub fn message_count(&self, session_id: &str) -> usize {
        let sessions = self.sessions.read().unwrap();
        sessions.get(session_id).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError> {
        let stored = message.into_message();
        let mut sessions = self.sessions.write().unwrap();
        sessions
            .entry(stored.session_id.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn list_by_session(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        let sessions = self.sessions.read().unwrap();
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }
}
