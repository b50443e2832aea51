//! Conversation storage.
//!
//! An append-only log of messages keyed by session identifier. A session
//! has no record of its own: it is the ordered set of messages sharing a
//! `session_id`, created implicitly by the first append and never deleted.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The author of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A message as stored in the conversation log.
///
/// Immutable once written. Serialized field names match the persisted
/// document layout of the wider application (`sessionId`, `userId`,
/// `createdAt`), so existing stored data stays readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// The payload for an append; the store assigns the id and timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub session_id: String,
    pub user_id: Option<i64>,
}

impl NewMessage {
    pub fn new(
        role: Role,
        content: impl Into<String>,
        session_id: impl Into<String>,
        user_id: Option<i64>,
    ) -> Self {
        Self {
            role,
            content: content.into(),
            session_id: session_id.into(),
            user_id,
        }
    }

    /// Finalize into a stored message with a fresh id and server timestamp.
    pub(crate) fn into_message(self) -> Message {
        Message {
            id: Uuid::new_v4(),
            role: self.role,
            content: self.content,
            session_id: self.session_id,
            user_id: self.user_id,
            created_at: Utc::now(),
        }
    }
}

/// Append-only access to the conversation log.
///
/// This is the only component permitted to mutate persisted message state;
/// existing messages are never updated or removed.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append a message and return it as stored, with assigned id and
    /// creation timestamp.
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// All messages for a session in insertion order.
    ///
    /// An unknown session yields an empty list, not an error.
    async fn list_by_session(&self, session_id: &str) -> Result<Vec<Message>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_field_names() {
        let message = NewMessage::new(Role::User, "hello", "s1", Some(7)).into_message();
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["role"], "user");
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["userId"], 7);
        assert!(json.get("createdAt").is_some());
        // snake_case must not leak into the persisted layout
        assert!(json.get("session_id").is_none());
    }

    #[test]
    fn test_message_without_user_id() {
        let message = NewMessage::new(Role::Assistant, "hi", "s1", None).into_message();
        let json = serde_json::to_value(&message).unwrap();

        assert!(json.get("userId").is_none());
    }

    #[test]
    fn test_role_round_trip() {
        for role in [Role::User, Role::Assistant, Role::System] {
            let json = serde_json::to_string(&role).unwrap();
            let back: Role = serde_json::from_str(&json).unwrap();
            assert_eq!(back, role);
        }
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
    }
}
