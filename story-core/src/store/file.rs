//! File-based conversation store.
//!
//! One JSON document per session under a base directory. Appends rewrite
//! the session file through a temp file and an atomic rename, so a crash
//! mid-write never leaves a truncated log behind.

use super::{ConversationStore, Message, NewMessage, StoreError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// File-backed store with atomic session-file rewrites.
#[derive(Debug)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `base_dir`, creating the directory if needed.
    pub async fn new(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).await?;
        Ok(Self { base_dir })
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        // Session ids are opaque client strings; sanitize before they
        // become file names
        let sanitized: String = session_id
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        self.base_dir.join(format!("{sanitized}.json"))
    }

    async fn read_session(&self, path: &Path) -> Result<Vec<Message>, StoreError> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_session(&self, path: &Path, messages: &[Message]) -> Result<(), StoreError> {
        let temp = path.with_extension("tmp");
        let content = serde_json::to_string_pretty(messages)?;
        fs::write(&temp, content).await?;
        fs::rename(&temp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for FileStore {
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError> {
        let path = self.session_path(&message.session_id);
        let mut messages = self.read_session(&path).await?;

        let stored = message.into_message();
        messages.push(stored.clone());
        self.write_session(&path, &messages).await?;

        Ok(stored)
    }

    async fn list_by_session(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        let path = self.session_path(session_id);
        self.read_session(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Role;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_unknown_session_is_empty() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileStore::new(dir.path()).await.unwrap();

        let messages = store.list_by_session("missing").await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_append_and_list() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileStore::new(dir.path()).await.unwrap();

        store
            .append(NewMessage::new(Role::User, "first", "s1", Some(1)))
            .await
            .unwrap();
        store
            .append(NewMessage::new(Role::Assistant, "second", "s1", None))
            .await
            .unwrap();

        let messages = store.list_by_session("s1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].content, "second");
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = TempDir::new().expect("temp dir");

        {
            let store = FileStore::new(dir.path()).await.unwrap();
            store
                .append(NewMessage::new(Role::User, "persisted", "s1", None))
                .await
                .unwrap();
        }

        let store = FileStore::new(dir.path()).await.unwrap();
        let messages = store.list_by_session("s1").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "persisted");
    }

    #[tokio::test]
    async fn test_session_id_sanitized() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileStore::new(dir.path()).await.unwrap();

        store
            .append(NewMessage::new(Role::User, "hi", "user/1:session", None))
            .await
            .unwrap();

        // Round-trips through the sanitized file name
        let messages = store.list_by_session("user/1:session").await.unwrap();
        assert_eq!(messages.len(), 1);

        // And nothing escaped the base directory
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let entry = entries.next_entry().await.unwrap().expect("one file");
        assert_eq!(entry.file_name(), "user_1_session.json");
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileStore::new(dir.path()).await.unwrap();

        store
            .append(NewMessage::new(Role::User, "hi", "s1", None))
            .await
            .unwrap();

        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            assert!(name.ends_with(".json"), "unexpected file: {name}");
        }
    }
}
