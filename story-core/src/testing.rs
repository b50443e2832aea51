//! Testing utilities for the storytelling core.
//!
//! This module provides tools for integration testing:
//! - `MockGenerator` for deterministic testing without API calls
//! - `TestHarness` for scripted conversation scenarios
//! - Assertion helpers for verifying the message log

use crate::generator::{FragmentStream, GenerateError, ReplyGenerator};
use crate::session::{Storyteller, StorytellerConfig};
use crate::store::{ConversationStore, MemoryStore, Message, Role};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A scripted generator response.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// A full reply returned buffered (or as a single fragment).
    Text(String),

    /// Reply fragments emitted one by one, passed through as scripted.
    Fragments(Vec<String>),

    /// A generation failure.
    Failure(String),
}

/// A generator that returns scripted replies in order.
///
/// Use this for deterministic tests without API calls. Exhausting the
/// script yields a fixed fallback reply. Every call is recorded so tests
/// can assert on what the orchestrator actually sent.
#[derive(Debug, Default)]
pub struct MockGenerator {
    replies: Mutex<VecDeque<MockReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

/// What the orchestrator handed the generator on one call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub user_message: String,
    pub history_len: usize,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a buffered reply.
    pub fn queue_reply(&self, text: impl Into<String>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(MockReply::Text(text.into()));
    }

    /// Queue a streamed reply as pre-normalized fragments.
    pub fn queue_fragments(&self, fragments: &[&str]) {
        self.replies.lock().unwrap().push_back(MockReply::Fragments(
            fragments.iter().map(|f| f.to_string()).collect(),
        ));
    }

    /// Queue a failure.
    pub fn queue_failure(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(MockReply::Failure(message.into()));
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, user_message: &str, history: &[Message]) {
        self.calls.lock().unwrap().push(RecordedCall {
            user_message: user_message.to_string(),
            history_len: history.len(),
        });
    }

    fn next_reply(&self) -> MockReply {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockReply::Text("The storyteller is out of words.".to_string()))
    }
}

#[async_trait]
impl ReplyGenerator for MockGenerator {
    async fn generate(
        &self,
        user_message: &str,
        history: &[Message],
    ) -> Result<String, GenerateError> {
        self.record(user_message, history);
        match self.next_reply() {
            MockReply::Text(text) => Ok(text),
            MockReply::Fragments(fragments) => Ok(fragments.concat()),
            MockReply::Failure(message) => Err(GenerateError::Api(claude::Error::Api {
                status: 500,
                message,
            })),
        }
    }

    async fn generate_stream(
        &self,
        user_message: &str,
        history: &[Message],
    ) -> Result<FragmentStream, GenerateError> {
        self.record(user_message, history);
        let items: Vec<Result<String, GenerateError>> = match self.next_reply() {
            MockReply::Text(text) => vec![Ok(text)],
            MockReply::Fragments(fragments) => fragments.into_iter().map(Ok).collect(),
            // Failures surface mid-stream, after the channel is open
            MockReply::Failure(message) => vec![Err(GenerateError::Stream(message))],
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// Test harness wiring a [`MemoryStore`] and a [`MockGenerator`] to a
/// [`Storyteller`].
pub struct TestHarness {
    pub storyteller: Storyteller,
    pub generator: Arc<MockGenerator>,
    pub store: Arc<MemoryStore>,
}

impl TestHarness {
    /// Create a harness with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StorytellerConfig::default())
    }

    /// Create a harness with a custom configuration.
    pub fn with_config(config: StorytellerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(MockGenerator::new());
        let store_dyn: Arc<dyn ConversationStore> = store.clone();
        let generator_dyn: Arc<dyn ReplyGenerator> = generator.clone();
        let storyteller = Storyteller::new(store_dyn, generator_dyn).with_config(config);

        Self {
            storyteller,
            generator,
            store,
        }
    }

    /// Queue a buffered reply.
    pub fn expect_reply(&self, text: impl Into<String>) -> &Self {
        self.generator.queue_reply(text);
        self
    }

    /// Queue a streamed reply.
    pub fn expect_fragments(&self, fragments: &[&str]) -> &Self {
        self.generator.queue_fragments(fragments);
        self
    }

    /// Queue a failure.
    pub fn expect_failure(&self, message: impl Into<String>) -> &Self {
        self.generator.queue_failure(message);
        self
    }

    /// The full message log for a session.
    pub async fn messages(&self, session_id: &str) -> Vec<Message> {
        self.store
            .list_by_session(session_id)
            .await
            .expect("memory store never fails")
    }

    /// Number of stored messages for a session.
    pub fn message_count(&self, session_id: &str) -> usize {
        self.store.message_count(session_id)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the message log carries exactly the given roles, in order.
#[track_caller]
pub fn assert_roles(messages: &[Message], expected: &[Role]) {
    let actual: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        actual, expected,
        "message log roles do not match expectation"
    );
}

/// Assert a log of `welcome + N user/assistant exchanges`.
#[track_caller]
pub fn assert_exchange_count(messages: &[Message], exchanges: usize) {
    assert_eq!(
        messages.len(),
        1 + 2 * exchanges,
        "expected welcome plus {exchanges} exchanges, got {} messages",
        messages.len()
    );
    let mut expected = vec![Role::Assistant];
    for _ in 0..exchanges {
        expected.push(Role::User);
        expected.push(Role::Assistant);
    }
    assert_roles(messages, &expected);
}
